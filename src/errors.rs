use std::time::Duration;

use thiserror::Error;

/// Failure of a single refresh cycle.
///
/// Every variant is absorbed by the refresh coordinator: the cached balance
/// keeps its last good figure and only its status flips to `error`.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Credential exchange rejected or unreachable after retry.
    #[error("auth error: {0}")]
    Auth(String),

    /// Job polling exceeded its time budget.
    #[error("upstream job '{job_id}' did not finish within {budget:?}")]
    UpstreamTimeout { job_id: String, budget: Duration },

    /// Upstream reported the fetch job as failed.
    #[error("upstream job rejected: {0}")]
    UpstreamRejected(String),

    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("account '{0}' not found in upstream result")]
    AccountNotFound(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl RefreshError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            RefreshError::Auth(_) => "auth",
            RefreshError::UpstreamTimeout { .. } => "timeout",
            RefreshError::UpstreamRejected(_) => "rejected",
            RefreshError::Transport(_) => "transport",
            RefreshError::AccountNotFound(_) => "account_not_found",
            RefreshError::Persistence(_) => "persistence",
        }
    }
}

impl From<reqwest::Error> for RefreshError {
    fn from(err: reqwest::Error) -> Self {
        RefreshError::Transport(err.to_string())
    }
}
