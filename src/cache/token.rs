use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Bearer token issued by the upstream credential exchange.
/// Persisted as `{ value, expires_at }`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: String, expires_at: DateTime<Utc>) -> Self {
        Self { value, expires_at }
    }

    /// Usable only while `now + safety_margin < expires_at`
    pub fn is_usable(&self, now: DateTime<Utc>, safety_margin: Duration) -> bool {
        now + safety_margin < self.expires_at
    }

    /// Authorization header value
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

// token value must never reach the logs
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
