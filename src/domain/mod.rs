pub mod audit;
pub mod vote;
