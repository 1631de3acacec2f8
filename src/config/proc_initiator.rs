use crate::config::cache::{
    CacheConfig, FRESHNESS_WINDOW_SECONDS_DEFAULT, REFRESH_CHECK_INTERVAL_SECONDS_DEFAULT,
    REQUEST_TIMEOUT_SECONDS_DEFAULT, SAFETY_MARGIN_SECONDS_DEFAULT,
};
use crate::config::settings::{LogFormat, LoggingConfig, RetryConfig};
use crate::config::upstream::PollConfig;
use crate::ServiceConfig;

pub const RETRY_ATTEMPTS_DEFAULT: u32 = 3;
pub const RETRY_BASE_DELAY_MS_DEFAULT: u64 = 200;
pub const RETRY_MAX_DELAY_MS_DEFAULT: u64 = 2000;

pub const POLL_INITIAL_DELAY_MS_DEFAULT: u64 = 1000;
pub const POLL_MAX_DELAY_MS_DEFAULT: u64 = 10_000;
pub const POLL_TIMEOUT_SECONDS_DEFAULT: u64 = 45;

pub const UPSTREAM_REQUEST_TIMEOUT_MS_DEFAULT: u64 = 10_000;

pub fn initiate_default_values(mut config: ServiceConfig) -> ServiceConfig {
    if config.settings.logging.is_none() {
        config.settings.logging = Some(LoggingConfig::new("info".to_owned(), LogFormat::Compact));
    }

    let retry = config.settings.retry.take().unwrap_or(RetryConfig {
        attempts: None,
        base_delay_ms: None,
        max_delay_ms: None,
    });
    config.settings.retry = Some(RetryConfig {
        attempts: retry.attempts.or(Some(RETRY_ATTEMPTS_DEFAULT)),
        base_delay_ms: retry.base_delay_ms.or(Some(RETRY_BASE_DELAY_MS_DEFAULT)),
        max_delay_ms: retry.max_delay_ms.or(Some(RETRY_MAX_DELAY_MS_DEFAULT)),
    });

    let poll = config.upstream.poll.take().unwrap_or(PollConfig {
        initial_delay_ms: None,
        max_delay_ms: None,
        timeout_seconds: None,
    });
    config.upstream.poll = Some(PollConfig {
        initial_delay_ms: poll.initial_delay_ms.or(Some(POLL_INITIAL_DELAY_MS_DEFAULT)),
        max_delay_ms: poll.max_delay_ms.or(Some(POLL_MAX_DELAY_MS_DEFAULT)),
        timeout_seconds: poll.timeout_seconds.or(Some(POLL_TIMEOUT_SECONDS_DEFAULT)),
    });
    config.upstream.request_timeout_ms = config
        .upstream
        .request_timeout_ms
        .or(Some(UPSTREAM_REQUEST_TIMEOUT_MS_DEFAULT));
    config.upstream.base_url = config.upstream.base_url.trim_end_matches('/').to_owned();

    config.cache = initiate_cache_defaults(config.cache);
    config
}

fn initiate_cache_defaults(cache: CacheConfig) -> CacheConfig {
    CacheConfig {
        freshness_window_seconds: cache
            .freshness_window_seconds
            .or(Some(FRESHNESS_WINDOW_SECONDS_DEFAULT)),
        safety_margin_seconds: cache
            .safety_margin_seconds
            .or(Some(SAFETY_MARGIN_SECONDS_DEFAULT)),
        refresh_check_interval_seconds: cache
            .refresh_check_interval_seconds
            .or(Some(REFRESH_CHECK_INTERVAL_SECONDS_DEFAULT)),
        request_timeout_seconds: cache
            .request_timeout_seconds
            .or(Some(REQUEST_TIMEOUT_SECONDS_DEFAULT)),
        ..cache
    }
}
