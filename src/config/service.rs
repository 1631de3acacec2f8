use serde::Deserialize;

use crate::config::cache::CacheConfig;
use crate::config::settings::SettingsConfig;
use crate::config::upstream::UpstreamConfig;

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}
