pub mod retry;
pub mod backoff;
