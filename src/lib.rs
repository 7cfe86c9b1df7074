//! Vote storage and result tallying over a relational store.
//!
//! Callers submit votes against arbitrary (target_type, target_id) entities;
//! the engine maintains cached aggregate results (sum, average, count,
//! per-option tallies) per (target, tag, value type) by destructive replace.
//! Repeated votes from the same actor roll over inside a configured window,
//! and deleting a target cascades to both votes and cached results.

pub mod aggregation;
pub mod config;
pub mod engine;
pub mod entities;
pub mod error;
pub mod result_store;
pub mod service;
pub mod vote_store;
pub mod window;

pub use aggregation::{FunctionRegistry, ResultFunction, ResultSet};
pub use config::{CalculationSchedule, VotingConfig, VotingSettings};
pub use engine::{AlterHook, ResultEngine, ResultsHook};
pub use error::{Result, VotingError};
pub use result_store::ResultStore;
pub use service::VotingService;
pub use vote_store::{VoteCriteria, VoteStore, VoteSubmission, VotedTarget};
pub use window::{VoteWindow, WindowOutcome, WindowPolicy};
