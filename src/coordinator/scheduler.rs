use std::time::Duration;

use anyhow::Result;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::balance::CachedBalance;
use crate::cache::store::DocumentStore;
use crate::cache::token::AccessToken;
use crate::coordinator::refresh::RefreshCoordinator;
use crate::sources::{FetchJobApi, TokenExchange};

/// Periodically refresh a stale balance so it does not wait for a visitor.
/// Runs until the task is dropped; cycle failures are already absorbed by
/// the coordinator.
pub async fn loop_refresh_stale_balance<A, TS, BS>(
    coordinator: RefreshCoordinator<A, TS, BS>,
    check_interval: Duration,
) -> Result<()>
where
    A: TokenExchange + FetchJobApi + 'static,
    TS: DocumentStore<AccessToken> + 'static,
    BS: DocumentStore<CachedBalance> + 'static,
{
    info!("staleness check every {:?}", check_interval);
    let mut ticker = interval(check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        debug!("staleness check cycle start");

        let outcome = coordinator.get_or_refresh(false).await;
        match (&outcome.error, outcome.refreshed) {
            (Some(err), _) => warn!("scheduled refresh failed: {}", err),
            (None, true) => info!("scheduled refresh stored a new balance"),
            (None, false) => debug!("balance still fresh"),
        }
    }
}
