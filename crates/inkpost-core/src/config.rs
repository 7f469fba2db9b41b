//! Root configuration model (`config.toml`).

use serde::{Deserialize, Serialize};

use crate::settings::{DEFAULT_API_URL, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS};

/// Default refresh margin: refresh five minutes before expiry.
pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 300;
/// Default TTL of the session record: one day.
pub const DEFAULT_AUTH_STATE_TTL_SECS: u64 = 86_400;
/// Default TTL of the settings record: thirty days.
pub const DEFAULT_SETTINGS_TTL_SECS: u64 = 2_592_000;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct InkpostConfig {
    #[serde(default)]
    pub origin: OriginConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub preferences: PreferencesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection to the content backend that owns the canonical settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct OriginConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            api_key: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,
    #[serde(default = "default_auth_state_ttl_secs")]
    pub auth_state_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
            auth_state_ttl_secs: DEFAULT_AUTH_STATE_TTL_SECS,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PreferencesConfig {
    #[serde(default = "default_settings_ttl_secs")]
    pub settings_ttl_secs: u64,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            settings_ttl_secs: DEFAULT_SETTINGS_TTL_SECS,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_refresh_margin_secs() -> u64 {
    DEFAULT_REFRESH_MARGIN_SECS
}

fn default_auth_state_ttl_secs() -> u64 {
    DEFAULT_AUTH_STATE_TTL_SECS
}

fn default_settings_ttl_secs() -> u64 {
    DEFAULT_SETTINGS_TTL_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}
