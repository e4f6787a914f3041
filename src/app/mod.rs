pub mod audit;
pub mod auth;
pub mod notifier;
pub mod store;
pub mod votes;
