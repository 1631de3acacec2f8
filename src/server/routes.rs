use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::balance::{BalanceStatus, CachedBalance};
use crate::cache::store::DocumentStore;
use crate::cache::token::AccessToken;
use crate::coordinator::refresh::RefreshCoordinator;
use crate::observability::metrics::get_metrics;
use crate::sources::{FetchJobApi, TokenExchange};

pub const GET_BALANCE_PATH: &str = "/get-balance";
pub const REFRESH_BALANCE_PATH: &str = "/refresh-balance";
pub const HEALTH_PATH: &str = "/health";

static PUBLIC_ERROR_MSG: &str = "Unable to fetch balance";

pub struct BalanceState<A, TS, BS> {
    pub coordinator: RefreshCoordinator<A, TS, BS>,
    /// how long `GET /get-balance` waits for a running refresh
    pub request_timeout: Duration,
}

impl<A, TS, BS> Clone for BalanceState<A, TS, BS> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

/// Public projection of the cached balance. Carries no upstream detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub status: BalanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refreshed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BalanceResponse {
    fn new(balance: CachedBalance, refreshed: Option<bool>) -> Self {
        let error = (balance.status == BalanceStatus::Error).then(|| PUBLIC_ERROR_MSG.to_owned());
        Self {
            amount: balance.amount,
            currency: balance.currency,
            fetched_at: balance.fetched_at,
            status: balance.status,
            refreshed,
            error,
        }
    }
}

impl<A, TS, BS> BalanceState<A, TS, BS>
where
    A: TokenExchange + FetchJobApi + 'static,
    TS: DocumentStore<AccessToken> + 'static,
    BS: DocumentStore<CachedBalance> + 'static,
{
    pub fn router<S>(self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        Router::new()
            .route(GET_BALANCE_PATH, get(get_balance::<A, TS, BS>))
            .route(
                REFRESH_BALANCE_PATH,
                get(refresh_balance::<A, TS, BS>).post(refresh_balance::<A, TS, BS>),
            )
            .route(HEALTH_PATH, get(|| async { "ok" }))
            .with_state(self)
    }
}

/// Cached value; a stale cache is refreshed first, bounded by the request timeout.
async fn get_balance<A, TS, BS>(State(state): State<BalanceState<A, TS, BS>>) -> Json<BalanceResponse>
where
    A: TokenExchange + FetchJobApi + 'static,
    TS: DocumentStore<AccessToken> + 'static,
    BS: DocumentStore<CachedBalance> + 'static,
{
    get_metrics().await.balance_requests.with_label_values(&["get"]).inc();

    let balance = match tokio::time::timeout(
        state.request_timeout,
        state.coordinator.get_or_refresh(false),
    )
    .await
    {
        Ok(outcome) => outcome.balance,
        Err(_) => {
            // the cycle keeps running and updates the cache for the next reader
            warn!("refresh still running after {:?}, serving cached value", state.request_timeout);
            state.coordinator.current()
        }
    };
    Json(BalanceResponse::new(balance, None))
}

/// Forced refresh; answers once the cycle completed or failed.
async fn refresh_balance<A, TS, BS>(
    State(state): State<BalanceState<A, TS, BS>>,
) -> Json<BalanceResponse>
where
    A: TokenExchange + FetchJobApi + 'static,
    TS: DocumentStore<AccessToken> + 'static,
    BS: DocumentStore<CachedBalance> + 'static,
{
    get_metrics().await.balance_requests.with_label_values(&["refresh"]).inc();

    let outcome = state.coordinator.get_or_refresh(true).await;
    info!("forced refresh finished, refreshed: {}", outcome.refreshed);
    Json(BalanceResponse::new(outcome.balance, Some(outcome.refreshed)))
}
