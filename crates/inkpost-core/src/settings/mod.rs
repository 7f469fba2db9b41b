//! Preferences domain module.
//!
//! - `model`: settings record, partial updates and preferences state
//! - `service`: the origin configuration service trait

mod model;
mod service;

pub use model::{
    ConnectionStatus, DEFAULT_API_URL, DEFAULT_MAX_RETRIES, DEFAULT_MAX_TOKENS,
    DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT_SECS, PreferencesState, Settings, SettingsPatch,
};
pub use service::{ConnectionProbe, SettingsService};
