//! In-memory origin service.
//!
//! Holds canonical settings in memory. Used for offline operation and as the
//! origin in tests, where `set_reachable(false)` simulates a backend outage.

use async_trait::async_trait;
use inkpost_core::error::{InkpostError, Result};
use inkpost_core::settings::{ConnectionProbe, Settings, SettingsPatch, SettingsService};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct InMemorySettingsService {
    settings: Arc<RwLock<Settings>>,
    models: Arc<RwLock<Vec<String>>>,
    reachable: Arc<AtomicBool>,
    get_calls: Arc<AtomicUsize>,
}

impl InMemorySettingsService {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(RwLock::new(settings)),
            models: Arc::new(RwLock::new(Vec::new())),
            reachable: Arc::new(AtomicBool::new(true)),
            get_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sets the models reported by `probe`.
    pub async fn set_models(&self, models: Vec<String>) {
        *self.models.write().await = models;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of `get_settings` calls served.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub async fn current(&self) -> Settings {
        self.settings.read().await.clone()
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(InkpostError::origin(None, "origin service unreachable"))
        }
    }
}

impl Default for InMemorySettingsService {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

#[async_trait]
impl SettingsService for InMemorySettingsService {
    async fn get_settings(&self) -> Result<Settings> {
        self.ensure_reachable()?;
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.settings.read().await.clone())
    }

    async fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings> {
        self.ensure_reachable()?;
        if let Some(temperature) = patch.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(InkpostError::origin(
                    Some(400),
                    format!("temperature {} out of range 0.0..=2.0", temperature),
                ));
            }
        }
        let mut settings = self.settings.write().await;
        settings.apply(patch);
        Ok(settings.clone())
    }

    async fn probe(&self) -> Result<ConnectionProbe> {
        self.ensure_reachable()?;
        Ok(ConnectionProbe {
            models: self.models.read().await.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_returns_canonical_settings() {
        let service = InMemorySettingsService::default();
        let updated = service
            .update_settings(&SettingsPatch::new().max_tokens(500))
            .await
            .unwrap();

        assert_eq!(updated.max_tokens, 500);
        assert_eq!(service.current().await.max_tokens, 500);
    }

    #[tokio::test]
    async fn test_rejects_out_of_range_temperature() {
        let service = InMemorySettingsService::default();
        let err = service
            .update_settings(&SettingsPatch::new().temperature(3.5))
            .await
            .unwrap_err();
        assert!(matches!(err, InkpostError::Origin { status: Some(400), .. }));
    }

    #[tokio::test]
    async fn test_unreachable() {
        let service = InMemorySettingsService::default();
        service.set_reachable(false);
        assert!(service.get_settings().await.unwrap_err().is_origin());
        assert!(service.probe().await.is_err());
        assert_eq!(service.get_calls(), 0);
    }
}
