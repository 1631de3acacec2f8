use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceStatus {
    Fresh,
    Stale,
    Error,
}

impl BalanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceStatus::Fresh => "fresh",
            BalanceStatus::Stale => "stale",
            BalanceStatus::Error => "error",
        }
    }
}

/// Last known balance, the only figure ever shown to the public.
/// Persisted as `{ amount, currency, fetched_at, status }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedBalance {
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub status: BalanceStatus,
}

impl CachedBalance {
    /// Nothing fetched yet
    pub fn empty() -> Self {
        Self {
            amount: None,
            currency: None,
            fetched_at: None,
            status: BalanceStatus::Stale,
        }
    }

    pub fn has_value(&self) -> bool {
        self.amount.is_some() && self.fetched_at.is_some()
    }
}

impl Default for CachedBalance {
    fn default() -> Self {
        Self::empty()
    }
}

/// Figure extracted from one successful upstream read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBalance {
    pub amount: Decimal,
    pub currency: String,
}
