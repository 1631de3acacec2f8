use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::store::DocumentStore;
use crate::cache::token::AccessToken;
use crate::errors::RefreshError;
use crate::helpers::time::{seconds, Clock};
use crate::observability::metrics::get_metrics;
use crate::resilience::retry::RetrySettings;
use crate::sources::TokenExchange;

#[derive(Default)]
struct TokenSlot {
    token: Option<AccessToken>,
    loaded: bool,
}

/// Owns the access token: loads it from the store, renews it before it gets
/// within `safety_margin` of expiry and persists every renewal.
///
/// The slot lock is held across the exchange, so concurrent callers that
/// find the token expired wait for the single renewal and reuse its result.
pub struct TokenManager<E, S> {
    exchange: Arc<E>,
    store: S,
    clock: Arc<dyn Clock>,
    safety_margin: Duration,
    retry: RetrySettings,
    slot: Mutex<TokenSlot>,
}

impl<E, S> TokenManager<E, S>
where
    E: TokenExchange,
    S: DocumentStore<AccessToken>,
{
    pub fn new(
        exchange: Arc<E>,
        store: S,
        clock: Arc<dyn Clock>,
        safety_margin_seconds: u64,
        retry: RetrySettings,
    ) -> Self {
        Self {
            exchange,
            store,
            clock,
            safety_margin: seconds(safety_margin_seconds),
            retry,
            slot: Mutex::new(TokenSlot::default()),
        }
    }

    /// Token valid for at least the safety margin, renewed first if needed.
    pub async fn get_valid_token(&self) -> Result<AccessToken, RefreshError> {
        let mut slot = self.slot.lock().await;

        if !slot.loaded {
            slot.token = self.store.load().await.unwrap_or_else(|err| {
                warn!("persisted token unreadable, renewing: {}", err);
                None
            });
            slot.loaded = true;
        }

        let now = self.clock.now();
        if let Some(token) = slot.token.as_ref().filter(|t| t.is_usable(now, self.safety_margin)) {
            debug!("reusing access token, expires_at: {}", token.expires_at);
            return Ok(token.clone());
        }

        info!("access token missing or within safety margin, renewing");
        let issued = self
            .retry
            .run_with_retry_if(
                || self.exchange.exchange(),
                |err| matches!(err, RefreshError::Transport(_)),
            )
            .await
            .map_err(|err| match err {
                RefreshError::Transport(msg) => {
                    RefreshError::Auth(format!("credential exchange unreachable: {}", msg))
                }
                other => other,
            })?;

        let expires_at = self
            .clock
            .now()
            .checked_add_signed(seconds(issued.expires_in_seconds))
            .ok_or_else(|| {
                RefreshError::Auth(format!(
                    "malformed token response: expires_in {} is out of range",
                    issued.expires_in_seconds
                ))
            })?;
        let token = AccessToken::new(issued.value, expires_at);
        get_metrics().await.token_renewals.inc();
        info!("access token renewed, expires_at: {}", token.expires_at);

        // the fresh token stays usable in memory even if it could not be persisted
        if let Err(err) = self.store.save(&token).await {
            warn!("failed to persist access token: {}", err);
        }
        slot.token = Some(token.clone());
        Ok(token)
    }

    /// Drop the current token after upstream refused it.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        slot.loaded = true;
        if slot.token.take().is_some() {
            info!("access token invalidated");
        }
    }
}
