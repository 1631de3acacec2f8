pub mod token;
pub mod balance;
pub mod balance_cache;
pub mod store;
