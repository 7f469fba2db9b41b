use inkpost_core::clock::Clock;
use inkpost_core::config::PreferencesConfig;
use inkpost_core::error::Result;
use inkpost_core::error_info::{ErrorInfo, codes};
use inkpost_core::remote::{Namespace, RemoteStore};
use inkpost_core::session::{IdentityKey, IdentitySource};
use inkpost_core::settings::{
    ConnectionStatus, PreferencesState, Settings, SettingsPatch, SettingsService,
};
use inkpost_core::signal::{SyncEvent, Topic};
use inkpost_infrastructure::BroadcastHub;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::StoreContext;
use crate::state::{StateContainer, SyncGuard};
use crate::sync::{ConnectivityMonitor, ConnectivityState, Transition, spawn_listener};

const NAME: &str = "PreferencesStore";

/// Settings store.
///
/// The origin service owns the canonical settings; this store caches them
/// per identity in the remote backend so a reload or a sibling instance can
/// pick them up without a round-trip to the origin.
///
/// Origin failures are returned to the caller and recorded in `error`.
/// Remote backend failures are absorbed and switch the store to
/// local-fallback mode.
#[derive(Clone)]
pub struct PreferencesStore {
    inner: Arc<PreferencesInner>,
}

struct PreferencesInner {
    instance_id: Uuid,
    state: StateContainer<PreferencesState>,
    identity: Option<Arc<dyn IdentitySource>>,
    fallback_key: IdentityKey,
    remote: Arc<dyn RemoteStore>,
    hub: BroadcastHub,
    clock: Arc<dyn Clock>,
    origin: Arc<dyn SettingsService>,
    monitor: ConnectivityMonitor,
    guard: SyncGuard,
    settings_ttl_secs: u64,
    listener: Mutex<Option<CancellationToken>>,
}

impl Drop for PreferencesInner {
    fn drop(&mut self) {
        if let Some(token) = self.listener.get_mut().ok().and_then(|slot| slot.take()) {
            token.cancel();
        }
    }
}

impl PreferencesStore {
    /// Creates a store scoped to its own anonymous identity.
    pub fn new(
        context: &StoreContext,
        config: &PreferencesConfig,
        origin: Arc<dyn SettingsService>,
    ) -> Self {
        Self::build(context, config, origin, None)
    }

    /// Creates a store scoped to whatever identity `identity` reports,
    /// typically the session store of the same instance.
    pub fn with_identity(
        context: &StoreContext,
        config: &PreferencesConfig,
        origin: Arc<dyn SettingsService>,
        identity: Arc<dyn IdentitySource>,
    ) -> Self {
        Self::build(context, config, origin, Some(identity))
    }

    fn build(
        context: &StoreContext,
        config: &PreferencesConfig,
        origin: Arc<dyn SettingsService>,
        identity: Option<Arc<dyn IdentitySource>>,
    ) -> Self {
        let store = Self {
            inner: Arc::new(PreferencesInner {
                instance_id: Uuid::new_v4(),
                state: StateContainer::default(),
                identity,
                fallback_key: IdentityKey::anonymous(),
                remote: Arc::clone(&context.remote),
                hub: context.hub.clone(),
                clock: Arc::clone(&context.clock),
                origin,
                monitor: ConnectivityMonitor::new(NAME, context.hub.clone()),
                guard: SyncGuard::new(),
                settings_ttl_secs: config.settings_ttl_secs,
                listener: Mutex::new(None),
            }),
        };
        store.ensure_listener();
        store
    }

    pub fn instance_id(&self) -> Uuid {
        self.inner.instance_id
    }

    pub fn snapshot(&self) -> PreferencesState {
        self.inner.state.snapshot()
    }

    pub fn settings(&self) -> Settings {
        self.inner.state.read(|s| s.settings.clone())
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PreferencesState> {
        self.inner.state.subscribe()
    }

    pub fn identity_key(&self) -> IdentityKey {
        self.inner.current_key()
    }

    pub fn is_fallback(&self) -> bool {
        self.inner.monitor.is_fallback()
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.inner.monitor.state()
    }

    /// Loads settings for the current identity.
    ///
    /// A cached record in the remote backend is adopted and the origin
    /// connection is tested; otherwise the settings are loaded from the
    /// origin and cached. Never fails: when the remote backend is down the
    /// error is recorded as `init_failed`, the store enters local-fallback
    /// mode and the origin load is still attempted.
    pub async fn initialize(&self) {
        self.ensure_listener();
        let inner = &self.inner;
        inner.state.update(|s| s.loading = true);

        if inner.monitor.is_fallback() {
            let _ = self.load_settings().await;
        } else {
            let key = inner.current_key();
            match inner.load_record(&key).await {
                Ok(Some(settings)) => {
                    tracing::info!("[{}] Restored settings for {}", NAME, key);
                    inner.adopt(settings);
                    self.test_connection().await;
                }
                Ok(None) => {
                    tracing::debug!("[{}] No cached settings for {}, loading from origin", NAME, key);
                    let _ = self.load_settings().await;
                }
                Err(e) => {
                    inner.monitor.record_failure(&e);
                    let _ = self.load_settings().await;
                    inner.state.update(|s| {
                        s.error = Some(ErrorInfo::from_error(
                            codes::INIT_FAILED,
                            "Failed to load settings",
                            &e,
                        ));
                    });
                }
            }
        }

        inner.state.update(|s| s.loading = false);
    }

    /// Fetches the canonical settings from the origin service and caches
    /// them.
    ///
    /// # Errors
    ///
    /// Returns the origin error, which is also recorded in `error`.
    pub async fn load_settings(&self) -> Result<Settings> {
        let inner = &self.inner;
        inner.state.update(|s| s.loading = true);

        match inner.origin.get_settings().await {
            Ok(settings) => {
                let now = inner.clock.now();
                let settings = inner.state.update(|s| {
                    s.settings = settings;
                    s.mark_connected(now);
                    s.error = None;
                    s.loading = false;
                    s.settings.clone()
                });
                Arc::clone(inner).push_state().await;
                Ok(settings)
            }
            Err(e) => {
                tracing::warn!("[{}] Failed to load settings: {}", NAME, e);
                inner.state.update(|s| {
                    s.mark_disconnected();
                    s.error = Some(ErrorInfo::from_error(
                        codes::ORIGIN_ERROR,
                        "Failed to load settings",
                        &e,
                    ));
                    s.loading = false;
                });
                Err(e)
            }
        }
    }

    /// Sends `patch` to the origin service and merges the canonical values
    /// of the patched fields into local state. Fields not in the patch keep
    /// their local values.
    ///
    /// # Errors
    ///
    /// Returns the origin error, which is also recorded in `error`.
    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings> {
        let inner = &self.inner;
        inner.state.update(|s| s.loading = true);

        match inner.origin.update_settings(&patch).await {
            Ok(canonical) => {
                let merge = patch.pick(&canonical);
                let settings = inner.state.update(|s| {
                    s.settings.apply(&merge);
                    s.error = None;
                    s.loading = false;
                    s.settings.clone()
                });
                Arc::clone(inner).push_state().await;
                inner.publish_updated(Some(settings.clone()));
                Ok(settings)
            }
            Err(e) => {
                tracing::warn!("[{}] Failed to update settings: {}", NAME, e);
                inner.state.update(|s| {
                    s.error = Some(ErrorInfo::from_error(
                        codes::ORIGIN_ERROR,
                        "Failed to update settings",
                        &e,
                    ));
                    s.loading = false;
                });
                Err(e)
            }
        }
    }

    /// Probes the origin service and its model server.
    ///
    /// Returns `false` on failure; the failure is recorded in state, never
    /// returned as an error.
    pub async fn test_connection(&self) -> bool {
        let inner = &self.inner;
        inner
            .state
            .update(|s| s.connection_status = ConnectionStatus::Connecting);

        match inner.origin.probe().await {
            Ok(probe) => {
                let now = inner.clock.now();
                inner.state.update(|s| {
                    s.mark_connected(now);
                    if !probe.models.is_empty() {
                        s.settings.active_models = probe.models;
                    }
                    if s.error.as_ref().is_some_and(|e| e.has_code(codes::CONNECTION_FAILED)) {
                        s.error = None;
                    }
                });
                Arc::clone(inner).push_state().await;
                true
            }
            Err(e) => {
                tracing::warn!("[{}] Connection test failed: {}", NAME, e);
                inner.state.update(|s| {
                    s.mark_disconnected();
                    s.error = Some(ErrorInfo::from_error(
                        codes::CONNECTION_FAILED,
                        "Connection test failed",
                        &e,
                    ));
                });
                false
            }
        }
    }

    /// Restores default settings locally, caches them best-effort and
    /// announces them to siblings.
    pub async fn reset_state(&self) {
        let inner = &self.inner;
        inner.state.replace(PreferencesState::default());
        Arc::clone(inner).push_state().await;
        inner.publish_updated(Some(Settings::default()));
    }

    /// Re-pulls the cached record for the current identity. Returns whether
    /// a record was adopted.
    pub async fn pull_remote(&self) -> bool {
        let inner = &self.inner;
        if inner.monitor.is_fallback() {
            return false;
        }
        let key = inner.current_key();
        match inner.load_record(&key).await {
            Ok(Some(settings)) => {
                inner.adopt(settings);
                true
            }
            Ok(None) => false,
            Err(e) => {
                inner.monitor.record_failure(&e);
                false
            }
        }
    }

    /// Probes the remote backend. Leaving fallback mode pushes the local
    /// settings once.
    pub async fn check_connectivity(&self) -> ConnectivityState {
        if self.inner.monitor.probe(self.inner.remote.as_ref()).await == Some(Transition::Restored) {
            Arc::clone(&self.inner).push_state().await;
        }
        self.inner.monitor.state()
    }

    /// Applies a hub signal.
    pub async fn handle_signal(&self, event: &SyncEvent) {
        match event {
            SyncEvent::ConnectivityFailed => {
                self.inner.monitor.apply_failed_signal();
            }
            SyncEvent::ConnectivityRestored => {
                if self.inner.monitor.apply_restored_signal() == Some(Transition::Restored) {
                    Arc::clone(&self.inner).push_state().await;
                }
            }
            SyncEvent::SettingsUpdated {
                origin,
                identity,
                settings,
                ..
            } if *origin != self.inner.instance_id
                && self.inner.current_key().as_str() == identity =>
            {
                tracing::debug!("[{}] Sibling {} updated settings", NAME, origin);
                match settings {
                    Some(settings) => self.inner.adopt(settings.clone()),
                    None => {
                        self.pull_remote().await;
                    }
                }
            }
            _ => {}
        }
    }

    fn ensure_listener(&self) {
        let mut slot = self.inner.lock_listener();
        if slot.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return;
        }
        let subscription = self.inner.hub.subscribe(&[Topic::Settings, Topic::Connectivity]);
        *slot = spawn_listener(
            NAME,
            subscription,
            Arc::downgrade(&self.inner),
            |inner: Arc<PreferencesInner>, event| async move {
                PreferencesStore { inner }.handle_signal(&event).await;
            },
        );
    }

    /// Stops the cross-instance listener.
    pub fn shutdown(&self) {
        if let Some(token) = self.inner.lock_listener().take() {
            token.cancel();
        }
    }
}

impl PreferencesInner {
    fn current_key(&self) -> IdentityKey {
        match &self.identity {
            Some(source) => source.identity_key(),
            None => self.fallback_key.clone(),
        }
    }

    fn lock_listener(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.listener.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn adopt(&self, settings: Settings) {
        let _guard = self.guard.enter();
        self.state.update(|s| s.settings = settings);
    }

    async fn load_record(&self, key: &IdentityKey) -> Result<Option<Settings>> {
        let Some(value) = self.remote.get(Namespace::Settings, key.as_str()).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(settings) => Ok(Some(settings)),
            Err(e) => {
                tracing::warn!("[{}] Ignoring unreadable settings record for {}: {}", NAME, key, e);
                Ok(None)
            }
        }
    }

    /// Caches the current settings in the remote backend.
    async fn push_state(self: Arc<Self>) {
        if self.guard.is_active() || self.monitor.is_fallback() {
            return;
        }
        let key = self.current_key();
        let record = match serde_json::to_value(self.state.read(|s| s.settings.clone())) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!("[{}] Failed to serialize settings: {}", NAME, e);
                return;
            }
        };
        if let Err(e) = self
            .remote
            .set(Namespace::Settings, key.as_str(), record, self.settings_ttl_secs)
            .await
        {
            self.monitor.record_failure(&e);
        }
    }

    fn publish_updated(&self, settings: Option<Settings>) {
        self.hub.publish(SyncEvent::SettingsUpdated {
            origin: self.instance_id,
            identity: self.current_key().to_string(),
            timestamp: self.clock.now(),
            settings,
        });
    }
}
