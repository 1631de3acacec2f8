use std::future::Future;

use tokio::time::{sleep, Duration};
use tracing::{error, warn};

use crate::config::proc_initiator::{
    RETRY_ATTEMPTS_DEFAULT, RETRY_BASE_DELAY_MS_DEFAULT, RETRY_MAX_DELAY_MS_DEFAULT,
};
use crate::config::settings::RetryConfig;

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetrySettings {
    pub fn from_config(retry: Option<&RetryConfig>) -> Self {
        Self {
            attempts: retry
                .and_then(|r| r.attempts)
                .unwrap_or(RETRY_ATTEMPTS_DEFAULT)
                .max(1),
            base_delay_ms: retry
                .and_then(|r| r.base_delay_ms)
                .unwrap_or(RETRY_BASE_DELAY_MS_DEFAULT),
            max_delay_ms: retry
                .and_then(|r| r.max_delay_ms)
                .unwrap_or(RETRY_MAX_DELAY_MS_DEFAULT),
        }
    }

    /// Retry while `is_retryable` accepts the error; delay doubles up to `max_delay_ms`.
    pub async fn run_with_retry_if<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        is_retryable: P,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let attempts = self.attempts.max(1);
        let mut delay = self.base_delay_ms;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && is_retryable(&e) => {
                    warn!("Attempt {attempt}/{attempts} failed: {e}");
                    sleep(Duration::from_millis(delay)).await;
                    delay = (delay * 2).min(self.max_delay_ms);
                    attempt += 1;
                }
                Err(e) => {
                    error!("giving up after {attempt} attempt(s): {e}");
                    return Err(e);
                }
            }
        }
    }
}
