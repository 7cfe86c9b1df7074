pub mod prelude;

pub mod vote;
pub mod vote_result;
