use sea_orm::DbErr;
use thiserror::Error;

/// Error surface of the voting core.
///
/// Validation failures are rejected before anything is written; storage
/// failures on the transactional replace path leave no partial state;
/// configuration failures surface at load time, never per-vote.
#[derive(Debug, Error)]
pub enum VotingError {
    #[error("invalid vote: {0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Storage(#[from] DbErr),

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, VotingError>;
