use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::balance::{BalanceStatus, CachedBalance, FetchedBalance};
use crate::cache::store::DocumentStore;
use crate::helpers::time::Clock;
use crate::observability::metrics::get_metrics;

/// Locally cached balance backed by a durable document.
///
/// Readers only take a short in-memory lock and never wait on the store;
/// writers are serialized among themselves and flush before publishing.
pub struct BalanceCache<S> {
    store: S,
    clock: Arc<dyn Clock>,
    freshness_window: Duration,
    state: RwLock<CachedBalance>,
    writer: Mutex<()>,
}

impl<S> BalanceCache<S>
where
    S: DocumentStore<CachedBalance>,
{
    pub fn new(store: S, clock: Arc<dyn Clock>, freshness_window: Duration) -> Self {
        Self {
            store,
            clock,
            freshness_window,
            state: RwLock::new(CachedBalance::empty()),
            writer: Mutex::new(()),
        }
    }

    /// Load the persisted record so a restart keeps serving the last value.
    pub async fn warm(&self) -> Result<()> {
        let persisted = self.store.load().await?;
        if let Some(balance) = persisted {
            info!(
                "balance cache warmed, fetched_at: {:?}, status: {}",
                balance.fetched_at,
                balance.status.as_str()
            );
            publish_fetched_at(&balance).await;
            *self.state.write().unwrap_or_else(PoisonError::into_inner) = balance;
        } else {
            info!("balance cache starts empty");
        }
        Ok(())
    }

    /// Current value; a `fresh` record past the window reads as `stale`.
    pub fn read(&self) -> CachedBalance {
        let mut balance = self.state.read().unwrap_or_else(PoisonError::into_inner).clone();
        if balance.status == BalanceStatus::Fresh
            && is_stale_at(&balance, self.clock.now(), self.freshness_window)
        {
            balance.status = BalanceStatus::Stale;
        }
        balance
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        is_stale_at(&state, now, self.freshness_window)
    }

    /// Replace amount/currency/fetched_at and mark `fresh`.
    /// Returns only after the record is durably stored.
    pub async fn write(&self, fetched: FetchedBalance, now: DateTime<Utc>) -> Result<CachedBalance> {
        let _writer = self.writer.lock().await;
        let balance = CachedBalance {
            amount: Some(fetched.amount),
            currency: Some(fetched.currency),
            fetched_at: Some(now),
            status: BalanceStatus::Fresh,
        };

        self.store.save(&balance).await?;
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = balance.clone();
        publish_fetched_at(&balance).await;
        debug!("balance cache updated, fetched_at: {}", now);
        Ok(balance)
    }

    /// Flip status to `error`, keeping the last good figure.
    /// Memory keeps the previous status if the record cannot be stored.
    pub async fn mark_error(&self, now: DateTime<Utc>) -> Result<CachedBalance> {
        let _writer = self.writer.lock().await;
        let mut balance = self.state.read().unwrap_or_else(PoisonError::into_inner).clone();
        balance.status = BalanceStatus::Error;

        self.store.save(&balance).await?;
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = balance.clone();
        warn!("balance cache marked as error at {}", now);
        Ok(balance)
    }
}

/// Stale when nothing was ever fetched or `now - fetched_at` exceeds the window
pub fn is_stale_at(balance: &CachedBalance, now: DateTime<Utc>, window: Duration) -> bool {
    match (balance.fetched_at, balance.amount) {
        (Some(fetched_at), Some(_)) => now - fetched_at > window,
        _ => true,
    }
}

async fn publish_fetched_at(balance: &CachedBalance) {
    if let Some(fetched_at) = balance.fetched_at {
        get_metrics().await.balance_fetched_at_unix.set(fetched_at.timestamp());
    }
}
