use std::sync::Arc;

use reqwest::Client;
use tracing::info;

use crate::cache::balance_cache::BalanceCache;
use crate::cache::store::JsonFileStore;
use crate::config::cache::{FRESHNESS_WINDOW_SECONDS_DEFAULT, SAFETY_MARGIN_SECONDS_DEFAULT};
use crate::config::upstream::UpstreamType;
use crate::coordinator::refresh::RefreshCoordinator;
use crate::helpers::time::{seconds, Clock};
use crate::resilience::backoff::PollPolicy;
use crate::resilience::retry::RetrySettings;
use crate::sources::demo::DemoBankApi;
use crate::sources::http::HttpBankApi;
use crate::sources::token_manager::TokenManager;
use crate::sources::upstream_client::UpstreamClient;
use crate::sources::UpstreamKind;
use crate::ServiceConfig;

/// Coordinator wired to the configured upstream and the on-disk records
pub type FileBackedCoordinator = RefreshCoordinator<UpstreamKind, JsonFileStore, JsonFileStore>;

pub fn build_upstream(cfg: &ServiceConfig, client: Client) -> UpstreamKind {
    match cfg.upstream.upstream_type {
        UpstreamType::Http => UpstreamKind::Http(HttpBankApi::new(&cfg.upstream, client)),
        UpstreamType::Demo => UpstreamKind::Demo(DemoBankApi::new(cfg.upstream.default_currency.clone())),
    }
}

pub fn build_file_backed(cfg: &ServiceConfig, client: Client, clock: Arc<dyn Clock>) -> FileBackedCoordinator {
    let api = Arc::new(build_upstream(cfg, client));
    info!(
        "upstream: {}, token record: {}, balance record: {}",
        api.name(),
        cfg.cache.token_path,
        cfg.cache.balance_path
    );

    let tokens = TokenManager::new(
        api.clone(),
        JsonFileStore::new(&cfg.cache.token_path),
        clock.clone(),
        cfg.cache.safety_margin_seconds.unwrap_or(SAFETY_MARGIN_SECONDS_DEFAULT),
        RetrySettings::from_config(cfg.settings.retry.as_ref()),
    );
    let upstream = UpstreamClient::new(api, PollPolicy::from_config(cfg.upstream.poll.as_ref()));
    let cache = BalanceCache::new(
        JsonFileStore::new(&cfg.cache.balance_path),
        clock.clone(),
        seconds(
            cfg.cache
                .freshness_window_seconds
                .unwrap_or(FRESHNESS_WINDOW_SECONDS_DEFAULT),
        ),
    );

    RefreshCoordinator::new(tokens, upstream, cache, clock)
}
