//! Preferences domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error_info::ErrorInfo;

pub const DEFAULT_API_URL: &str = "http://localhost:1234";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Generation and connection settings for the model server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Base URL of the model server.
    pub api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Models reported by the last successful probe.
    #[serde(default)]
    pub active_models: Vec<String>,
    #[serde(default)]
    pub last_connected: Option<DateTime<Utc>>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            active_models: Vec::new(),
            last_connected: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl Settings {
    /// Field-level merge: only fields present in `patch` are overwritten.
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(api_url) = &patch.api_url {
            self.api_url = api_url.clone();
        }
        if let Some(api_key) = &patch.api_key {
            self.api_key = Some(api_key.clone());
        }
        if let Some(models) = &patch.active_models {
            self.active_models = models.clone();
        }
        if let Some(last_connected) = patch.last_connected {
            self.last_connected = Some(last_connected);
        }
        if let Some(temperature) = patch.temperature {
            self.temperature = temperature;
        }
        if let Some(max_tokens) = patch.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(timeout_secs) = patch.timeout_secs {
            self.timeout_secs = timeout_secs;
        }
        if let Some(max_retries) = patch.max_retries {
            self.max_retries = max_retries;
        }
    }
}

/// Partial settings update. Absent fields are left untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_models: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl SettingsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Same shape as `self`, with values taken from `canonical`.
    ///
    /// Used to merge an origin service response back into local state
    /// without touching fields the caller did not ask to change.
    pub fn pick(&self, canonical: &Settings) -> SettingsPatch {
        SettingsPatch {
            api_url: self.api_url.as_ref().map(|_| canonical.api_url.clone()),
            api_key: self.api_key.as_ref().and(canonical.api_key.clone()),
            active_models: self
                .active_models
                .as_ref()
                .map(|_| canonical.active_models.clone()),
            last_connected: self.last_connected.and(canonical.last_connected),
            temperature: self.temperature.map(|_| canonical.temperature),
            max_tokens: self.max_tokens.map(|_| canonical.max_tokens),
            timeout_secs: self.timeout_secs.map(|_| canonical.timeout_secs),
            max_retries: self.max_retries.map(|_| canonical.max_retries),
        }
    }
}

/// Connection status of the origin service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Connecting,
    #[default]
    Disconnected,
}

/// Preferences store state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesState {
    pub settings: Settings,
    #[serde(default)]
    pub loading: bool,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub connection_status: ConnectionStatus,
}

impl PreferencesState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_connected(&mut self, at: DateTime<Utc>) {
        self.connected = true;
        self.connection_status = ConnectionStatus::Connected;
        self.settings.last_connected = Some(at);
    }

    pub fn mark_disconnected(&mut self) {
        self.connected = false;
        self.connection_status = ConnectionStatus::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_merge_keeps_untouched_fields() {
        let mut settings = Settings::default();
        settings.apply(&SettingsPatch::new().max_tokens(500));

        assert_eq!(settings.max_tokens, 500);
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(settings.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_patch_serialization_skips_absent_fields() {
        let patch = SettingsPatch::new().temperature(0.2);
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, serde_json::json!({ "temperature": 0.2 }));
        assert!(!patch.is_empty());
        assert!(SettingsPatch::new().is_empty());
    }

    #[test]
    fn test_mark_connected_and_disconnected() {
        let mut state = PreferencesState::new();
        assert_eq!(state.connection_status, ConnectionStatus::Disconnected);

        let now = Utc::now();
        state.mark_connected(now);
        assert!(state.connected);
        assert_eq!(state.settings.last_connected, Some(now));

        state.mark_disconnected();
        assert!(!state.connected);
        assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
    }
}
