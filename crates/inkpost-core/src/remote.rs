//! Remote key-value backend interface.
//!
//! The remote store is shared by every running instance of the application
//! and acts as the system of record; the stores only cache it. It is treated
//! as an opaque namespaced key-value store with per-record TTL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Record namespaces used by the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Serialized session state, by identity.
    AuthState,
    /// Access token record, by identity.
    Token,
    /// Serialized settings, by identity.
    Settings,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::AuthState => "auth_state",
            Namespace::Token => "token",
            Namespace::Settings => "settings",
        }
    }

    /// Fully qualified storage key, `"<namespace>:<key>"`.
    pub fn key(&self, key: &str) -> String {
        format!("{}:{}", self.as_str(), key)
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self { healthy: true }
    }

    pub fn unhealthy() -> Self {
        Self { healthy: false }
    }
}

/// Remote key-value backend.
///
/// Any `Err` is a network/availability failure. Callers in this workspace
/// never surface these to the UI; they switch to local-fallback mode instead.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns the record, or `None` if it is missing or expired.
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Value>>;

    /// Stores a record that expires after `ttl_secs` seconds.
    async fn set(&self, namespace: Namespace, key: &str, record: Value, ttl_secs: u64)
    -> Result<()>;

    async fn delete(&self, namespace: Namespace, key: &str) -> Result<()>;

    async fn health_check(&self) -> Result<HealthStatus>;
}
