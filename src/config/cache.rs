use serde::Deserialize;

pub const FRESHNESS_WINDOW_SECONDS_DEFAULT: u64 = 24 * 60 * 60;
pub const SAFETY_MARGIN_SECONDS_DEFAULT: u64 = 60;
pub const REFRESH_CHECK_INTERVAL_SECONDS_DEFAULT: u64 = 300;
pub const REQUEST_TIMEOUT_SECONDS_DEFAULT: u64 = 20;

/// ================================
/// Local state: token + balance records
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_token_path")]
    pub token_path: String,
    #[serde(default = "default_balance_path")]
    pub balance_path: String,
    /// max age of a balance before it is refreshed
    pub freshness_window_seconds: Option<u64>,
    /// a token is renewed once `now + safety_margin >= expires_at`
    pub safety_margin_seconds: Option<u64>,
    /// background staleness check period
    pub refresh_check_interval_seconds: Option<u64>,
    /// how long a dashboard request waits for a running refresh
    pub request_timeout_seconds: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            token_path: default_token_path(),
            balance_path: default_balance_path(),
            freshness_window_seconds: None,
            safety_margin_seconds: None,
            refresh_check_interval_seconds: None,
            request_timeout_seconds: None,
        }
    }
}

fn default_token_path() -> String {
    "access_token.json".to_owned()
}

fn default_balance_path() -> String {
    "balance_cache.json".to_owned()
}
