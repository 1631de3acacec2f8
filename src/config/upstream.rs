use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://au-api.basiq.io";
pub const DEFAULT_CURRENCY: &str = "AUD";

/// ================================
/// Upstream banking API
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    #[serde(rename = "type", default)]
    pub upstream_type: UpstreamType,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub account: AccountSelector,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    /// per-request timeout of every upstream HTTP call
    pub request_timeout_ms: Option<u64>,
    pub poll: Option<PollConfig>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamType {
    #[default]
    Http,
    Demo,
}

/// Which account of the connection carries the published balance.
/// `account_id` wins when both are set.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AccountSelector {
    pub account_id: Option<String>,
    pub institution_id: Option<String>,
}

impl AccountSelector {
    pub fn describe(&self) -> String {
        match (&self.account_id, &self.institution_id) {
            (Some(id), _) => format!("account_id={}", id),
            (None, Some(inst)) => format!("institution_id={}", inst),
            (None, None) => "<unset>".to_owned(),
        }
    }
}

/// Backoff schedule for job polling
#[derive(Debug, Deserialize, Clone)]
pub struct PollConfig {
    pub initial_delay_ms: Option<u64>,
    /// invariant: >= initial_delay_ms
    pub max_delay_ms: Option<u64>,
    /// overall budget for one job
    pub timeout_seconds: Option<u64>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_owned()
}
