pub mod refresh;
pub mod scheduler;
pub mod builder;
