use std::sync::Arc;

use anyhow::{Result, anyhow};
use inkpost_core::config::InkpostConfig;
use inkpost_core::remote::RemoteStore;
use inkpost_infrastructure::telemetry::init_tracing;
use inkpost_infrastructure::{BroadcastHub, ConfigService, HttpSettingsService};

use crate::context::StoreContext;
use crate::registry::StoreRegistry;

/// Wired application state: configuration plus the store registry.
pub struct AppBootstrap {
    pub config: InkpostConfig,
    pub registry: Arc<StoreRegistry>,
}

impl AppBootstrap {
    /// Loads `~/.config/inkpost/config.toml` and wires the stores against
    /// `remote`.
    pub fn initialize(remote: Arc<dyn RemoteStore>) -> Result<Self> {
        let config_service =
            ConfigService::new().map_err(|e| anyhow!("Failed to resolve config path: {}", e))?;
        Self::with_config_service(&config_service, remote)
    }

    /// Same as [`AppBootstrap::initialize`] with an explicit config source.
    pub fn with_config_service(
        config_service: &ConfigService,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self> {
        let config = config_service
            .load()
            .map_err(|e| anyhow!("Failed to load config: {}", e))?;

        if init_tracing(&config.logging) {
            tracing::debug!("[Bootstrap] Tracing initialized at level {}", config.logging.level);
        }
        tracing::info!(
            "[Bootstrap] Config loaded from {:?}, origin {}",
            config_service.path(),
            config.origin.base_url
        );

        let origin = HttpSettingsService::new(&config.origin)
            .map_err(|e| anyhow!("Failed to create origin client: {}", e))?;

        let context = StoreContext::new(remote, BroadcastHub::new());
        let registry = StoreRegistry::new(context, config.clone(), Arc::new(origin));

        Ok(Self {
            config,
            registry: Arc::new(registry),
        })
    }
}
