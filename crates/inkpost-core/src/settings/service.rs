//! Origin configuration service interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::settings::model::{Settings, SettingsPatch};

/// Result of a successful connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionProbe {
    /// Model identifiers reported by the model server.
    #[serde(default)]
    pub models: Vec<String>,
}

/// Service owning the canonical settings (the content backend).
///
/// Errors from this service are meant to reach the UI, so implementations
/// return [`crate::InkpostError::Origin`] for transport and status failures.
#[async_trait]
pub trait SettingsService: Send + Sync {
    async fn get_settings(&self) -> Result<Settings>;

    /// Applies `patch` and returns the canonical settings after the update.
    async fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings>;

    /// Checks that the service and its model server are reachable.
    async fn probe(&self) -> Result<ConnectionProbe>;
}
