use inkpost_core::config::InkpostConfig;
use inkpost_core::settings::SettingsService;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::context::StoreContext;
use crate::preferences::PreferencesStore;
use crate::session::SessionStore;

/// Stores belonging to one lifecycle owner.
struct StoreScope {
    session: SessionStore,
    preferences: Option<PreferencesStore>,
}

/// Creates store instances on demand and hands out the same instances to
/// every caller with the same owner.
///
/// An owner is whatever bounds the lifetime of the stores in the host, for
/// example a window or a tab. Each owner gets its own instances, all
/// sharing one remote backend and one broadcast hub, so they behave like
/// sibling tabs.
pub struct StoreRegistry {
    context: StoreContext,
    config: InkpostConfig,
    origin: Arc<dyn SettingsService>,
    scopes: Mutex<HashMap<String, StoreScope>>,
}

impl StoreRegistry {
    pub fn new(
        context: StoreContext,
        config: InkpostConfig,
        origin: Arc<dyn SettingsService>,
    ) -> Self {
        Self {
            context,
            config,
            origin,
            scopes: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &StoreContext {
        &self.context
    }

    pub fn config(&self) -> &InkpostConfig {
        &self.config
    }

    /// Returns the owner's session store, creating it on first use.
    pub fn session(&self, owner: &str) -> SessionStore {
        let mut scopes = self.lock_scopes();
        self.scope_mut(&mut scopes, owner).session.clone()
    }

    /// Returns the owner's preferences store, creating it (and the session
    /// store whose identity it follows) on first use.
    pub fn preferences(&self, owner: &str) -> PreferencesStore {
        let mut scopes = self.lock_scopes();
        let scope = self.scope_mut(&mut scopes, owner);
        if let Some(preferences) = &scope.preferences {
            return preferences.clone();
        }

        let preferences = PreferencesStore::with_identity(
            &self.context,
            &self.config.preferences,
            Arc::clone(&self.origin),
            Arc::new(scope.session.clone()),
        );
        scope.preferences = Some(preferences.clone());
        preferences
    }

    /// Shuts down and forgets the owner's stores. Returns `false` when the
    /// owner had none.
    pub fn release(&self, owner: &str) -> bool {
        let Some(scope) = self.lock_scopes().remove(owner) else {
            return false;
        };
        scope.session.shutdown();
        if let Some(preferences) = scope.preferences {
            preferences.shutdown();
        }
        tracing::debug!("[StoreRegistry] Released stores for {}", owner);
        true
    }

    pub fn owners(&self) -> Vec<String> {
        let mut owners: Vec<String> = self.lock_scopes().keys().cloned().collect();
        owners.sort();
        owners
    }

    fn lock_scopes(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoreScope>> {
        self.scopes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn scope_mut<'a>(
        &self,
        scopes: &'a mut HashMap<String, StoreScope>,
        owner: &str,
    ) -> &'a mut StoreScope {
        scopes.entry(owner.to_string()).or_insert_with(|| {
            tracing::debug!("[StoreRegistry] Creating stores for {}", owner);
            StoreScope {
                session: SessionStore::new(&self.context, &self.config.session),
                preferences: None,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkpost_core::session::IdentitySource;
    use inkpost_infrastructure::{BroadcastHub, InMemoryRemoteStore, InMemorySettingsService};

    fn registry() -> StoreRegistry {
        let context = StoreContext::new(Arc::new(InMemoryRemoteStore::new()), BroadcastHub::new());
        StoreRegistry::new(
            context,
            InkpostConfig::default(),
            Arc::new(InMemorySettingsService::default()),
        )
    }

    #[tokio::test]
    async fn test_same_owner_gets_same_instances() {
        let registry = registry();
        let a = registry.session("tab-1");
        let b = registry.session("tab-1");
        let c = registry.session("tab-2");

        assert_eq!(a.instance_id(), b.instance_id());
        assert_ne!(a.instance_id(), c.instance_id());
        assert_eq!(registry.owners(), vec!["tab-1".to_string(), "tab-2".to_string()]);
    }

    #[tokio::test]
    async fn test_preferences_follow_session_identity() {
        let registry = registry();
        let preferences = registry.preferences("tab-1");
        let session = registry.session("tab-1");

        assert_eq!(preferences.identity_key(), session.identity_key());

        session.set_user(Some(inkpost_core::session::UserProfile::new("u1", "A")));
        assert_eq!(preferences.identity_key().as_str(), "u1");
    }

    #[tokio::test]
    async fn test_release_forgets_owner() {
        let registry = registry();
        let first = registry.session("tab-1");
        assert!(registry.release("tab-1"));
        assert!(!registry.release("tab-1"));

        let second = registry.session("tab-1");
        assert_ne!(first.instance_id(), second.instance_id());
    }
}
