#![allow(unused_imports)]

pub use super::vote::Entity as Vote;
pub use super::vote_result::Entity as VoteResult;
