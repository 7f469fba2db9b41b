//! Configuration service implementation.
//!
//! Loads the root configuration from `~/.config/inkpost/config.toml`,
//! creating the file with defaults when it is missing, and applies
//! environment overrides on top.

use crate::paths::InkpostPaths;
use inkpost_core::config::InkpostConfig;
use inkpost_core::error::Result;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

pub const ENV_ORIGIN_URL: &str = "INKPOST_ORIGIN_URL";
pub const ENV_ORIGIN_TIMEOUT: &str = "INKPOST_ORIGIN_TIMEOUT";
pub const ENV_ORIGIN_RETRIES: &str = "INKPOST_ORIGIN_RETRIES";
pub const ENV_ORIGIN_API_KEY: &str = "INKPOST_ORIGIN_API_KEY";
pub const ENV_LOG_LEVEL: &str = "INKPOST_LOG_LEVEL";

/// Configuration service that loads and caches the root configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    /// Cached configuration loaded from file.
    /// Uses RwLock for thread-safe lazy loading.
    config: Arc<RwLock<Option<InkpostConfig>>>,
}

impl ConfigService {
    /// Creates a service for the default config location.
    pub fn new() -> Result<Self> {
        let path = InkpostPaths::new(None).config_file()?;
        Ok(Self::with_path(path))
    }

    /// Creates a service reading the given file.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            config: Arc::new(RwLock::new(None)),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Gets the configuration, loading from file if not cached.
    ///
    /// A broken or unreadable file falls back to defaults (with environment
    /// overrides still applied) and is logged.
    pub fn get_config(&self) -> InkpostConfig {
        {
            let read_lock = self.config.read().unwrap_or_else(|e| e.into_inner());
            if let Some(ref cached) = *read_lock {
                return cached.clone();
            }
        }

        let loaded = self.load().unwrap_or_else(|e| {
            tracing::warn!(
                "[ConfigService] Failed to load {:?}, using defaults: {}",
                self.path,
                e
            );
            let mut config = InkpostConfig::default();
            apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            config
        });

        let mut write_lock = self.config.write().unwrap_or_else(|e| e.into_inner());
        *write_lock = Some(loaded.clone());
        loaded
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut write_lock = self.config.write().unwrap_or_else(|e| e.into_inner());
        *write_lock = None;
    }

    /// Reads the file (creating it with defaults if missing) and applies
    /// environment overrides.
    pub fn load(&self) -> Result<InkpostConfig> {
        let mut config = if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            toml::from_str::<InkpostConfig>(&content)?
        } else {
            let config = InkpostConfig::default();
            self.save(&config)?;
            tracing::info!("[ConfigService] Created default config at {:?}", self.path);
            config
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    /// Writes the configuration file.
    pub fn save(&self, config: &InkpostConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.path, content)?;
        self.invalidate_cache();
        Ok(())
    }
}

/// Applies environment overrides using `lookup` to read variables.
///
/// Unparseable numeric values are ignored with a warning.
pub fn apply_env_overrides<F>(config: &mut InkpostConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_ORIGIN_URL) {
        config.origin.base_url = url;
    }
    if let Some(raw) = lookup(ENV_ORIGIN_TIMEOUT) {
        match raw.parse() {
            Ok(secs) => config.origin.timeout_secs = secs,
            Err(_) => tracing::warn!("[ConfigService] Ignoring invalid {}={}", ENV_ORIGIN_TIMEOUT, raw),
        }
    }
    if let Some(raw) = lookup(ENV_ORIGIN_RETRIES) {
        match raw.parse() {
            Ok(retries) => config.origin.max_retries = retries,
            Err(_) => tracing::warn!("[ConfigService] Ignoring invalid {}={}", ENV_ORIGIN_RETRIES, raw),
        }
    }
    if let Some(key) = lookup(ENV_ORIGIN_API_KEY) {
        config.origin.api_key = Some(key);
    }
    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config.logging.level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_creates_default_file_when_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let service = ConfigService::with_path(path.clone());

        let config = service.load().unwrap();

        assert!(path.exists());
        assert_eq!(config.session, InkpostConfig::default().session);
    }

    #[test]
    fn test_reads_existing_file_and_caches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[session]\nrefresh_margin_secs = 120\n\n[preferences]\nsettings_ttl_secs = 60\n",
        )
        .unwrap();
        let service = ConfigService::with_path(path.clone());

        let first = service.get_config();
        assert_eq!(first.session.refresh_margin_secs, 120);
        assert_eq!(first.preferences.settings_ttl_secs, 60);

        std::fs::write(&path, "[session]\nrefresh_margin_secs = 10\n").unwrap();
        assert_eq!(service.get_config().session.refresh_margin_secs, 120);

        service.invalidate_cache();
        assert_eq!(service.get_config().session.refresh_margin_secs, 10);
    }

    #[test]
    fn test_broken_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[session\nnot toml").unwrap();
        let service = ConfigService::with_path(path);

        assert!(service.load().is_err());
        let config = service.get_config();
        assert_eq!(config.session, InkpostConfig::default().session);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_ORIGIN_URL, "http://backend:5000"),
            (ENV_ORIGIN_TIMEOUT, "5"),
            (ENV_ORIGIN_RETRIES, "not-a-number"),
            (ENV_LOG_LEVEL, "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = InkpostConfig::default();
        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.origin.base_url, "http://backend:5000");
        assert_eq!(config.origin.timeout_secs, 5);
        assert_eq!(config.origin.max_retries, InkpostConfig::default().origin.max_retries);
        assert_eq!(config.logging.level, "debug");
        assert!(config.origin.api_key.is_none());
    }
}
