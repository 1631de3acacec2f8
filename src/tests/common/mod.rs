// tests/common/mod.rs
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;

use crate::cache::balance::{CachedBalance, FetchedBalance};
use crate::cache::balance_cache::BalanceCache;
use crate::cache::store::MemoryStore;
use crate::cache::token::AccessToken;
use crate::coordinator::refresh::RefreshCoordinator;
use crate::errors::RefreshError;
use crate::helpers::time::{seconds, Clock};
use crate::resilience::backoff::PollPolicy;
use crate::resilience::retry::RetrySettings;
use crate::sources::job::{FetchJob, JobState};
use crate::sources::token_manager::TokenManager;
use crate::sources::upstream_client::UpstreamClient;
use crate::sources::{FetchJobApi, IssuedToken, TokenExchange};

pub type TestCoordinator =
    RefreshCoordinator<ScriptedApi, MemoryStore<AccessToken>, MemoryStore<CachedBalance>>;

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

pub fn decimal(value: &str) -> Decimal {
    Decimal::from_str(value).expect("decimal literal")
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

/// Wall clock moved by hand
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self { now: Mutex::new(now) })
    }

    pub fn advance(&self, secs: i64) {
        *self.now.lock().unwrap() += chrono::Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ExchangeStep {
    Issue { ttl_seconds: u64 },
    Unreachable,
    Rejected,
}

#[derive(Debug, Clone, Copy)]
pub enum PollStep {
    State(JobState),
    Transient,
}

/// In-memory upstream replaying scripted responses and counting calls
pub struct ScriptedApi {
    pub exchanges: AtomicUsize,
    pub initiations: AtomicUsize,
    pub polls: AtomicUsize,
    pub reads: AtomicUsize,
    exchange_script: Mutex<VecDeque<ExchangeStep>>,
    poll_script: Mutex<VecDeque<PollStep>>,
    default_job_state: JobState,
    exchange_delay: Duration,
    initiate_delay: Duration,
    balance: Mutex<FetchedBalance>,
}

impl ScriptedApi {
    pub fn new(amount: &str, currency: &str) -> Self {
        Self {
            exchanges: AtomicUsize::new(0),
            initiations: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            exchange_script: Mutex::new(VecDeque::new()),
            poll_script: Mutex::new(VecDeque::new()),
            default_job_state: JobState::Succeeded,
            exchange_delay: Duration::ZERO,
            initiate_delay: Duration::ZERO,
            balance: Mutex::new(FetchedBalance {
                amount: decimal(amount),
                currency: currency.to_owned(),
            }),
        }
    }

    pub fn with_exchanges(self, steps: &[ExchangeStep]) -> Self {
        self.exchange_script.lock().unwrap().extend(steps.iter().copied());
        self
    }

    pub fn with_polls(self, steps: &[PollStep]) -> Self {
        self.poll_script.lock().unwrap().extend(steps.iter().copied());
        self
    }

    pub fn with_default_job_state(mut self, state: JobState) -> Self {
        self.default_job_state = state;
        self
    }

    pub fn with_exchange_delay(mut self, delay: Duration) -> Self {
        self.exchange_delay = delay;
        self
    }

    pub fn with_initiate_delay(mut self, delay: Duration) -> Self {
        self.initiate_delay = delay;
        self
    }

    pub fn set_balance(&self, amount: &str) {
        self.balance.lock().unwrap().amount = decimal(amount);
    }

    pub fn upstream_calls(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
            + self.initiations.load(Ordering::SeqCst)
            + self.polls.load(Ordering::SeqCst)
            + self.reads.load(Ordering::SeqCst)
    }
}

impl TokenExchange for ScriptedApi {
    async fn exchange(&self) -> Result<IssuedToken, RefreshError> {
        let n = self.exchanges.fetch_add(1, Ordering::SeqCst);
        if !self.exchange_delay.is_zero() {
            tokio::time::sleep(self.exchange_delay).await;
        }
        let step = self
            .exchange_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ExchangeStep::Issue { ttl_seconds: 3600 });
        match step {
            ExchangeStep::Issue { ttl_seconds } => Ok(IssuedToken {
                value: format!("token-{}", n + 1),
                expires_in_seconds: ttl_seconds,
            }),
            ExchangeStep::Unreachable => Err(RefreshError::Transport("connection refused".into())),
            ExchangeStep::Rejected => Err(RefreshError::Auth("invalid_client".into())),
        }
    }
}

impl FetchJobApi for ScriptedApi {
    async fn initiate(&self, _token: &AccessToken) -> Result<FetchJob, RefreshError> {
        let n = self.initiations.fetch_add(1, Ordering::SeqCst);
        if !self.initiate_delay.is_zero() {
            tokio::time::sleep(self.initiate_delay).await;
        }
        Ok(FetchJob::submitted(format!("job-{}", n + 1)))
    }

    async fn job_status(&self, _token: &AccessToken, job_id: &str) -> Result<FetchJob, RefreshError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .poll_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PollStep::State(self.default_job_state));
        match step {
            PollStep::State(state) => Ok(FetchJob {
                job_id: job_id.to_owned(),
                result_id: (state == JobState::Succeeded).then(|| format!("/results/{}", job_id)),
                state,
                failure: (state == JobState::Failed).then(|| "step 'verify-credentials' failed".to_owned()),
            }),
            PollStep::Transient => Err(RefreshError::Transport("503 Service Unavailable".into())),
        }
    }

    async fn read_result(&self, _token: &AccessToken, _job: &FetchJob) -> Result<FetchedBalance, RefreshError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.balance.lock().unwrap().clone())
    }
}

pub fn fast_retry() -> RetrySettings {
    RetrySettings { attempts: 3, base_delay_ms: 1, max_delay_ms: 2 }
}

pub fn fast_poll() -> PollPolicy {
    PollPolicy {
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        timeout: Duration::from_secs(2),
    }
}

pub struct Harness {
    pub api: Arc<ScriptedApi>,
    pub clock: Arc<ManualClock>,
    pub token_store: MemoryStore<AccessToken>,
    pub balance_store: MemoryStore<CachedBalance>,
    pub coordinator: TestCoordinator,
}

/// Coordinator over a scripted upstream, memory stores and a manual clock.
/// The balance cache is warmed from `balance_store`.
pub async fn harness(
    api: ScriptedApi,
    balance_store: MemoryStore<CachedBalance>,
    poll: PollPolicy,
) -> Harness {
    let api = Arc::new(api);
    let clock = ManualClock::new(t0());
    let token_store = MemoryStore::new();

    let tokens = TokenManager::new(
        api.clone(),
        token_store.clone(),
        clock.clone() as Arc<dyn Clock>,
        60,
        fast_retry(),
    );
    let upstream = UpstreamClient::new(api.clone(), poll);
    let cache = BalanceCache::new(
        balance_store.clone(),
        clock.clone() as Arc<dyn Clock>,
        seconds(24 * 60 * 60),
    );
    cache.warm().await.expect("warm cache");

    let coordinator = RefreshCoordinator::new(tokens, upstream, cache, clock.clone() as Arc<dyn Clock>);
    Harness { api, clock, token_store, balance_store, coordinator }
}
