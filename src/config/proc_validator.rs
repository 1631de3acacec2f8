//! Configuration validation with aggregated errors.
//! Every problem is collected so a broken config is reported in one pass.

use tracing::{error, info};

use crate::config::cache::CacheConfig;
use crate::config::settings::{RetryConfig, SettingsConfig};
use crate::config::upstream::{PollConfig, UpstreamConfig, UpstreamType};
use crate::observability::metrics::get_metrics;
use crate::ServiceConfig;

// ten years
const MAX_WINDOW_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub async fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);
    validate_upstream(&cfg.upstream, &mut errors);
    validate_cache(&cfg.cache, &mut errors);

    if errors.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", errors.len());
        for e in &errors {
            error!(" - {}", e);
        }
        get_metrics().await.config_validation_errors.inc();
        Err(errors)
    }
}

/// SETTINGS VALIDATION
fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if let Some(retry) = &settings.retry {
        validate_retry("settings.retry", retry, errors);
    }

    if settings.server.host.trim().is_empty() {
        errors.push("settings.server.host must not be empty".to_owned());
    }
    if settings.server.port == 0 {
        errors.push("settings.server.port must be > 0".to_owned());
    }

    let metrics = &settings.metrics;
    if !metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            metrics.path
        ));
    }

    if let Some(logging) = &settings.logging {
        let valid = ["trace", "debug", "info", "warn", "error"];
        if !valid.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' invalid; allowed: {:?}",
                logging.level, valid
            ));
        }
    }
}

fn validate_retry(path: &str, retry: &RetryConfig, errors: &mut Vec<String>) {
    if retry.attempts == Some(0) {
        errors.push(format!("{}.attempts must be > 0", path));
    }
    if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
        if max < base {
            errors.push(format!(
                "{}.max_delay_ms ({}) must be >= base_delay_ms ({})",
                path, max, base
            ));
        }
    }
}

/// UPSTREAM VALIDATION
fn validate_upstream(upstream: &UpstreamConfig, errors: &mut Vec<String>) {
    if let Some(poll) = &upstream.poll {
        validate_poll("upstream.poll", poll, errors);
    }
    if upstream.request_timeout_ms == Some(0) {
        errors.push("upstream.request_timeout_ms must be > 0".to_owned());
    }
    if upstream.default_currency.trim().len() != 3 {
        errors.push(format!(
            "upstream.default_currency '{}' must be a 3-letter ISO code",
            upstream.default_currency
        ));
    }

    // demo upstream needs no credentials
    if upstream.upstream_type == UpstreamType::Demo {
        return;
    }

    if !(upstream.base_url.starts_with("http://") || upstream.base_url.starts_with("https://")) {
        errors.push(format!(
            "upstream.base_url '{}' must start with http:// or https://",
            upstream.base_url
        ));
    }
    for (name, value) in [
        ("client_id", &upstream.client_id),
        ("client_secret", &upstream.client_secret),
        ("user_id", &upstream.user_id),
        ("connection_id", &upstream.connection_id),
    ] {
        if value.trim().is_empty() {
            errors.push(format!("upstream.{} must not be empty", name));
        }
    }
    let account = &upstream.account;
    if account.account_id.as_deref().map_or(true, str::is_empty)
        && account.institution_id.as_deref().map_or(true, str::is_empty)
    {
        errors.push("upstream.account requires account_id or institution_id".to_owned());
    }
}

fn validate_poll(path: &str, poll: &PollConfig, errors: &mut Vec<String>) {
    if poll.initial_delay_ms == Some(0) {
        errors.push(format!("{}.initial_delay_ms must be > 0", path));
    }
    if let (Some(initial), Some(max)) = (poll.initial_delay_ms, poll.max_delay_ms) {
        if max < initial {
            errors.push(format!(
                "{}.max_delay_ms ({}) must be >= initial_delay_ms ({})",
                path, max, initial
            ));
        }
    }
    if poll.timeout_seconds == Some(0) {
        errors.push(format!("{}.timeout_seconds must be > 0", path));
    }
}

/// CACHE VALIDATION
fn validate_cache(cache: &CacheConfig, errors: &mut Vec<String>) {
    if cache.token_path.trim().is_empty() {
        errors.push("cache.token_path must not be empty".to_owned());
    }
    if cache.balance_path.trim().is_empty() {
        errors.push("cache.balance_path must not be empty".to_owned());
    }
    if cache.token_path == cache.balance_path {
        errors.push(format!(
            "cache.token_path and cache.balance_path must differ ('{}')",
            cache.token_path
        ));
    }
    match cache.freshness_window_seconds {
        Some(0) => errors.push("cache.freshness_window_seconds must be > 0".to_owned()),
        Some(s) if s > MAX_WINDOW_SECONDS => errors.push(format!(
            "cache.freshness_window_seconds ({}) is unreasonably large",
            s
        )),
        _ => {}
    }
    match cache.refresh_check_interval_seconds {
        Some(0) => errors.push("cache.refresh_check_interval_seconds must be > 0".to_owned()),
        Some(s) if s > MAX_WINDOW_SECONDS => errors.push(format!(
            "cache.refresh_check_interval_seconds ({}) is unreasonably large",
            s
        )),
        _ => {}
    }
    if cache.request_timeout_seconds == Some(0) {
        errors.push("cache.request_timeout_seconds must be > 0".to_owned());
    }
    if let Some(s) = cache.safety_margin_seconds {
        if s > 60 * 60 * 24 {
            errors.push(format!(
                "cache.safety_margin_seconds ({}) is unreasonably large",
                s
            ));
        }
    }
}
