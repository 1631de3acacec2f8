use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cache::balance::CachedBalance;
use crate::cache::balance_cache::BalanceCache;
use crate::cache::store::DocumentStore;
use crate::cache::token::AccessToken;
use crate::errors::RefreshError;
use crate::helpers::time::Clock;
use crate::observability::metrics::{get_metrics, try_metrics};
use crate::sources::token_manager::TokenManager;
use crate::sources::upstream_client::UpstreamClient;
use crate::sources::{FetchJobApi, TokenExchange};

static SUCCEEDED_MSG: &str = "succeeded";
static FAILED_MSG: &str = "failed";

/// What a caller of `get_or_refresh` gets back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// cached value after the call
    pub balance: CachedBalance,
    /// an upstream cycle ran for this call and succeeded
    pub refreshed: bool,
    /// failure of the cycle this call observed
    pub error: Option<String>,
}

impl RefreshOutcome {
    fn cached(balance: CachedBalance) -> Self {
        Self { balance, refreshed: false, error: None }
    }
}

type InFlight = watch::Receiver<Option<RefreshOutcome>>;

struct Inner<A, TS, BS> {
    tokens: TokenManager<A, TS>,
    upstream: UpstreamClient<A>,
    cache: BalanceCache<BS>,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<Option<InFlight>>,
}

/// Serializes refreshes: at most one upstream cycle runs at a time and every
/// caller arriving while it runs receives that cycle's outcome.
///
/// Cycles run on their own task, so a caller giving up early does not abort
/// the refresh; the cache is still updated for the next reader.
pub struct RefreshCoordinator<A, TS, BS> {
    inner: Arc<Inner<A, TS, BS>>,
}

impl<A, TS, BS> Clone for RefreshCoordinator<A, TS, BS> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

enum Attached {
    Ready(RefreshOutcome),
    Waiting(InFlight),
}

/// Clears the in-flight slot when a cycle ends, including by panic
struct InFlightGuard<'a>(&'a Mutex<Option<InFlight>>);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
        set_in_flight_gauge(0);
    }
}

fn set_in_flight_gauge(value: i64) {
    if let Some(metrics) = try_metrics() {
        metrics.refresh_in_flight.set(value);
    }
}

impl<A, TS, BS> RefreshCoordinator<A, TS, BS>
where
    A: TokenExchange + FetchJobApi + 'static,
    TS: DocumentStore<AccessToken> + 'static,
    BS: DocumentStore<CachedBalance> + 'static,
{
    pub fn new(
        tokens: TokenManager<A, TS>,
        upstream: UpstreamClient<A>,
        cache: BalanceCache<BS>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                tokens,
                upstream,
                cache,
                clock,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Current cached value; never touches the upstream.
    pub fn current(&self) -> CachedBalance {
        self.inner.cache.read()
    }

    pub fn cache(&self) -> &BalanceCache<BS> {
        &self.inner.cache
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Cached value if fresh (unless `force`), otherwise the outcome of the
    /// running or a newly started refresh cycle.
    pub async fn get_or_refresh(&self, force: bool) -> RefreshOutcome {
        if !force && !self.inner.cache.is_stale(self.inner.clock.now()) {
            debug!("balance cache is fresh, serving cached value");
            return RefreshOutcome::cached(self.inner.cache.read());
        }

        let rx = match self.attach_or_start(force) {
            Attached::Ready(outcome) => return outcome,
            Attached::Waiting(rx) => rx,
        };

        let outcome = wait_outcome(rx).await;
        outcome.unwrap_or_else(|| {
            error!("refresh cycle ended without an outcome");
            RefreshOutcome {
                balance: self.inner.cache.read(),
                refreshed: false,
                error: Some("refresh cycle aborted".to_owned()),
            }
        })
    }

    fn attach_or_start(&self, force: bool) -> Attached {
        let mut slot = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(rx) = slot.as_ref() {
            debug!("refresh already in flight, attaching");
            if let Some(metrics) = try_metrics() {
                metrics.refresh_waiters.inc();
            }
            return Attached::Waiting(rx.clone());
        }

        // a cycle may have completed while this caller was checking staleness
        if !force && !self.inner.cache.is_stale(self.inner.clock.now()) {
            return Attached::Ready(RefreshOutcome::cached(self.inner.cache.read()));
        }

        let (tx, rx) = watch::channel(None);
        *slot = Some(rx.clone());
        set_in_flight_gauge(1);
        info!("starting refresh cycle, forced: {}", force);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let guard = InFlightGuard(&inner.in_flight);
            let outcome = inner.run_cycle().await;
            drop(guard);
            let _ = tx.send(Some(outcome));
        });
        Attached::Waiting(rx)
    }
}

async fn wait_outcome(mut rx: InFlight) -> Option<RefreshOutcome> {
    rx.wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|outcome| outcome.clone())
}

impl<A, TS, BS> Inner<A, TS, BS>
where
    A: TokenExchange + FetchJobApi,
    TS: DocumentStore<AccessToken>,
    BS: DocumentStore<CachedBalance>,
{
    async fn run_cycle(&self) -> RefreshOutcome {
        let metrics = get_metrics().await;
        let start = Instant::now();

        let outcome = match self.refresh_once().await {
            Ok(balance) => {
                metrics.refresh_cycles.with_label_values(&[SUCCEEDED_MSG]).inc();
                info!("refresh cycle succeeded in {:?}", start.elapsed());
                RefreshOutcome { balance, refreshed: true, error: None }
            }
            Err(err) => {
                metrics.refresh_cycles.with_label_values(&[FAILED_MSG]).inc();
                metrics.refresh_failures.with_label_values(&[err.reason()]).inc();
                warn!("refresh cycle failed: {}", err);

                if matches!(err, RefreshError::Auth(_)) {
                    self.tokens.invalidate().await;
                }
                let balance = match self.cache.mark_error(self.clock.now()).await {
                    Ok(balance) => balance,
                    Err(persist_err) => {
                        error!("failed to persist error status: {}", persist_err);
                        self.cache.read()
                    }
                };
                RefreshOutcome { balance, refreshed: false, error: Some(err.to_string()) }
            }
        };

        metrics
            .refresh_duration
            .with_label_values(&[if outcome.refreshed { SUCCEEDED_MSG } else { FAILED_MSG }])
            .observe(start.elapsed().as_secs_f64());
        outcome
    }

    async fn refresh_once(&self) -> Result<CachedBalance, RefreshError> {
        let token = self.tokens.get_valid_token().await?;
        let fetched = self.upstream.fetch_balance(&token).await?;
        let balance = self.cache.write(fetched, self.clock.now()).await?;
        Ok(balance)
    }
}
