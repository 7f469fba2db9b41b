//! In-memory remote store.
//!
//! Stands in for the shared key-value cache during local operation and in
//! tests. Clones share the same map, so two store instances built from
//! clones of one `InMemoryRemoteStore` behave like two tabs talking to the
//! same backend. Availability can be toggled to simulate an outage.

use async_trait::async_trait;
use inkpost_core::error::{InkpostError, Result};
use inkpost_core::remote::{HealthStatus, Namespace, RemoteStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
    record: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Clone)]
pub struct InMemoryRemoteStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    available: Arc<AtomicBool>,
    /// Number of get/set/delete calls that reached the store.
    calls: Arc<AtomicUsize>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Simulates an outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Total data operations attempted, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of live records.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining time-to-live of a record, if it exists.
    pub async fn ttl(&self, namespace: Namespace, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries
            .get(&namespace.key(key))
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at - now)
    }

    fn begin(&self, op: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.is_available() {
            Ok(())
        } else {
            Err(InkpostError::remote(format!("{} failed: backend unavailable", op)))
        }
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Value>> {
        self.begin("get")?;
        let full_key = namespace.key(key);
        let now = Instant::now();

        let mut entries = self.entries.write().await;
        match entries.get(&full_key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.record.clone())),
            Some(_) => {
                entries.remove(&full_key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        namespace: Namespace,
        key: &str,
        record: Value,
        ttl_secs: u64,
    ) -> Result<()> {
        self.begin("set")?;
        let now = Instant::now();
        let entry = Entry {
            record,
            expires_at: now + Duration::from_secs(ttl_secs),
        };
        let mut entries = self.entries.write().await;
        // Records written once and never read again would otherwise linger.
        entries.retain(|_, e| e.is_live(now));
        entries.insert(namespace.key(key), entry);
        Ok(())
    }

    async fn delete(&self, namespace: Namespace, key: &str) -> Result<()> {
        self.begin("delete")?;
        let mut entries = self.entries.write().await;
        entries.remove(&namespace.key(key));
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        if self.is_available() {
            Ok(HealthStatus::healthy())
        } else {
            Ok(HealthStatus::unhealthy())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemoryRemoteStore::new();
        store
            .set(Namespace::AuthState, "u1", json!({"authenticated": true}), 60)
            .await
            .unwrap();

        let record = store.get(Namespace::AuthState, "u1").await.unwrap();
        assert_eq!(record, Some(json!({"authenticated": true})));

        // Same key in another namespace is a different record.
        assert!(store.get(Namespace::Token, "u1").await.unwrap().is_none());

        store.delete(Namespace::AuthState, "u1").await.unwrap();
        assert!(store.get(Namespace::AuthState, "u1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_expire_after_ttl() {
        let store = InMemoryRemoteStore::new();
        store.set(Namespace::Token, "u1", json!("t"), 10).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.get(Namespace::Token, "u1").await.unwrap().is_some());
        assert_eq!(
            store.ttl(Namespace::Token, "u1").await,
            Some(Duration::from_secs(1))
        );

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get(Namespace::Token, "u1").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_prunes_expired_records() {
        let store = InMemoryRemoteStore::new();
        store
            .set(Namespace::AuthState, "anon-1", json!({}), 5)
            .await
            .unwrap();
        store
            .set(Namespace::AuthState, "anon-2", json!({}), 60)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        store.set(Namespace::Settings, "u1", json!({}), 60).await.unwrap();

        let entries = store.entries.read().await;
        assert_eq!(entries.len(), 2);
        assert!(!entries.contains_key(&Namespace::AuthState.key("anon-1")));
    }

    #[tokio::test]
    async fn test_unavailable_backend_fails_and_counts_calls() {
        let store = InMemoryRemoteStore::new();
        store.set_available(false);

        let err = store.get(Namespace::Settings, "u1").await.unwrap_err();
        assert!(err.is_remote());
        assert!(
            store
                .set(Namespace::Settings, "u1", json!({}), 60)
                .await
                .is_err()
        );
        assert_eq!(store.call_count(), 2);

        let health = store.health_check().await.unwrap();
        assert!(!health.healthy);

        store.set_available(true);
        assert!(store.health_check().await.unwrap().healthy);
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let a = InMemoryRemoteStore::new();
        let b = a.clone();
        a.set(Namespace::AuthState, "u1", json!(1), 60).await.unwrap();
        assert_eq!(b.get(Namespace::AuthState, "u1").await.unwrap(), Some(json!(1)));
    }
}
