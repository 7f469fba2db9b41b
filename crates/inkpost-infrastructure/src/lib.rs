pub mod broadcast;
pub mod config_service;
pub mod http_settings_service;
pub mod memory_remote_store;
pub mod memory_settings_service;
pub mod paths;
pub mod telemetry;

pub use crate::broadcast::{BroadcastHub, Subscription};
pub use crate::config_service::ConfigService;
pub use crate::http_settings_service::HttpSettingsService;
pub use crate::memory_remote_store::InMemoryRemoteStore;
pub use crate::memory_settings_service::InMemorySettingsService;
