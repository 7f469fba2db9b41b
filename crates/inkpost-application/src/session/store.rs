use chrono::{DateTime, Utc};
use inkpost_core::clock::Clock;
use inkpost_core::config::SessionConfig;
use inkpost_core::error::InkpostError;
use inkpost_core::error_info::{ErrorInfo, codes};
use inkpost_core::remote::{Namespace, RemoteStore};
use inkpost_core::session::{IdentityKey, IdentitySource, SessionState, TokenInfo, UserProfile};
use inkpost_core::signal::{SyncEvent, Topic};
use inkpost_infrastructure::BroadcastHub;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::StoreContext;
use crate::state::{StateContainer, SyncGuard};
use crate::sync::{
    ConnectivityMonitor, ConnectivityState, RefreshScheduler, SyncHandle, Transition,
    spawn_listener,
};

const NAME: &str = "SessionStore";

/// Authentication/session store.
///
/// Holds the session state of one application instance, mirrors it to the
/// remote backend under the current identity key and keeps sibling
/// instances in step through the broadcast hub.
///
/// Every action applies its local mutation before returning. Remote writes
/// are dispatched in the background and reported through a [`SyncHandle`];
/// remote failures never reach the caller, they switch the store to
/// local-fallback mode instead.
///
/// Cloning is cheap and yields another handle to the same store.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    instance_id: Uuid,
    state: StateContainer<SessionState>,
    /// Identity used while no user is signed in.
    fallback_key: IdentityKey,
    remote: Arc<dyn RemoteStore>,
    hub: BroadcastHub,
    clock: Arc<dyn Clock>,
    monitor: ConnectivityMonitor,
    scheduler: RefreshScheduler,
    guard: SyncGuard,
    auth_state_ttl_secs: u64,
    /// Signed-in identities the state moved away from whose records are
    /// still to be cleared.
    departed: Mutex<Vec<IdentityKey>>,
    listener: Mutex<Option<CancellationToken>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(token) = self.listener.get_mut().ok().and_then(|slot| slot.take()) {
            token.cancel();
        }
    }
}

impl SessionStore {
    /// Creates a store with an anonymous identity.
    pub fn new(context: &StoreContext, config: &SessionConfig) -> Self {
        Self::build(context, config, IdentityKey::anonymous())
    }

    /// Creates a store whose identity, until a user is set, is `hint`
    /// instead of a fresh anonymous key.
    ///
    /// Used to resume a known user's session in a new instance.
    pub fn with_identity_hint(
        context: &StoreContext,
        config: &SessionConfig,
        hint: IdentityKey,
    ) -> Self {
        Self::build(context, config, hint)
    }

    fn build(context: &StoreContext, config: &SessionConfig, fallback_key: IdentityKey) -> Self {
        let store = Self {
            inner: Arc::new(SessionInner {
                instance_id: Uuid::new_v4(),
                state: StateContainer::default(),
                fallback_key,
                remote: Arc::clone(&context.remote),
                hub: context.hub.clone(),
                clock: Arc::clone(&context.clock),
                monitor: ConnectivityMonitor::new(NAME, context.hub.clone()),
                scheduler: RefreshScheduler::new(config.refresh_margin_secs, context.hub.clone()),
                guard: SyncGuard::new(),
                auth_state_ttl_secs: config.auth_state_ttl_secs,
                departed: Mutex::new(Vec::new()),
                listener: Mutex::new(None),
            }),
        };
        store.ensure_listener();
        store
    }

    /// Unique id of this instance, carried as `origin` by its markers.
    pub fn instance_id(&self) -> Uuid {
        self.inner.instance_id
    }

    // ============================================================================
    // Read access
    // ============================================================================

    pub fn snapshot(&self) -> SessionState {
        self.inner.state.snapshot()
    }

    /// Subscribes to state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Flag set, token present and not expired.
    pub fn is_authenticated(&self) -> bool {
        let now = self.inner.clock.now();
        self.inner.state.read(|s| s.is_authenticated(now))
    }

    pub fn token_expired(&self) -> bool {
        let now = self.inner.clock.now();
        self.inner.state.read(|s| s.token_expired(now))
    }

    pub fn is_fallback(&self) -> bool {
        self.inner.monitor.is_fallback()
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.inner.monitor.state()
    }

    /// When the pending refresh timer fires, if one is armed.
    pub fn scheduled_refresh_at(&self) -> Option<DateTime<Utc>> {
        self.inner.scheduler.scheduled_at()
    }

    // ============================================================================
    // Lifecycle
    // ============================================================================

    /// Loads the persisted session for the current identity.
    ///
    /// Safe to call more than once. Never fails: a remote failure is
    /// recorded as an `init_failed` error and switches the store to
    /// local-fallback mode.
    pub async fn initialize(&self) {
        self.ensure_listener();
        let inner = &self.inner;
        inner.state.update(|s| s.loading = true);

        if inner.monitor.is_fallback() {
            tracing::debug!("[{}] Initialize in fallback mode, remote load skipped", NAME);
        } else {
            let key = self.identity_key();
            match inner.load_record(&key).await {
                Ok(Some(record)) => {
                    tracing::info!("[{}] Restored session for {}", NAME, key);
                    self.adopt(record);
                }
                Ok(None) => {
                    tracing::debug!("[{}] No persisted session for {}", NAME, key);
                }
                Err(e) => {
                    inner.state.update(|s| {
                        s.error = Some(ErrorInfo::from_error(
                            codes::INIT_FAILED,
                            "Failed to load session",
                            &e,
                        ));
                    });
                    inner.monitor.record_failure(&e);
                }
            }
        }

        inner.state.update(|s| s.loading = false);
    }

    /// Stops the cross-instance listener and cancels the refresh timer.
    pub fn shutdown(&self) {
        if let Some(token) = self.inner.lock_listener().take() {
            token.cancel();
        }
        self.inner.scheduler.cancel();
    }

    // ============================================================================
    // Actions
    // ============================================================================

    /// Sets the raw authenticated flag. Clearing it also clears the user,
    /// token and expiry in the same mutation.
    pub fn set_authenticated(&self, value: bool) -> SyncHandle {
        if !value {
            self.inner.scheduler.cancel();
        }
        self.mutate(|s| s.set_authenticated(value))
    }

    pub fn set_user(&self, user: Option<UserProfile>) -> SyncHandle {
        self.mutate(|s| s.user = user)
    }

    /// Stores a new access token, writes the token record and re-arms the
    /// refresh timer.
    ///
    /// A token that is already expired, or expires within the refresh
    /// margin, publishes `TokenExpired` instead of arming a timer.
    pub fn set_token_info(&self, info: TokenInfo) -> SyncHandle {
        self.apply_token(info, |_| {})
    }

    /// Local only.
    pub fn set_error(&self, error: Option<ErrorInfo>) {
        self.inner.state.update(|s| s.error = error);
    }

    pub fn clear_error(&self) {
        self.set_error(None);
    }

    pub fn set_redirect_path(&self, path: Option<String>) -> SyncHandle {
        self.mutate(|s| s.redirect_path = path)
    }

    pub fn clear_redirect_path(&self) -> SyncHandle {
        self.set_redirect_path(None)
    }

    /// Local only.
    pub fn set_loading(&self, loading: bool) {
        self.inner.state.update(|s| s.loading = loading);
    }

    /// Local only.
    pub fn set_popup_open(&self, open: bool) {
        self.inner.state.update(|s| s.popup_open = open);
    }

    /// Clears the session back to defaults.
    ///
    /// The remote session and token records are deleted best-effort, then
    /// `AuthStateUpdated` is published so siblings drop their copy too.
    pub fn reset(&self) -> SyncHandle {
        let inner = &self.inner;
        let key = self.identity_key();
        inner.scheduler.cancel();
        inner.state.replace(SessionState::default());

        if inner.monitor.is_fallback() {
            inner.publish_updated(&key);
            return SyncHandle::skipped();
        }

        let task_inner = Arc::clone(inner);
        SyncHandle::spawn(async move {
            if let Err(e) = task_inner.delete_records(&key).await {
                tracing::warn!("[{}] Failed to delete records for {}: {}", NAME, key, e);
                task_inner.monitor.record_failure(&e);
            }
            task_inner.publish_updated(&key);
        })
    }

    /// Signs in: sets the user and token together, then publishes
    /// `LoginSuccess`.
    pub fn complete_login(&self, user: UserProfile, info: TokenInfo) -> SyncHandle {
        let identity = user.id.clone();
        let handle = self.apply_token(info, move |s| {
            s.user = Some(user);
            s.error = None;
            s.popup_open = false;
        });
        self.inner.hub.publish(SyncEvent::LoginSuccess { identity });
        handle
    }

    /// Records a failed interactive login as `login_failed` and publishes
    /// `LoginError`.
    pub fn fail_login(&self, message: impl Into<String>) {
        let detail = ErrorInfo::new(codes::LOGIN_FAILED, "Login failed", message);
        self.inner.state.update(|s| {
            s.error = Some(detail.clone());
            s.loading = false;
            s.popup_open = false;
        });
        self.inner.hub.publish(SyncEvent::LoginError { detail });
    }

    /// Resets the session and publishes `Logout`.
    pub fn logout(&self) -> SyncHandle {
        tracing::info!("[{}] Logout for {}", NAME, self.identity_key());
        let handle = self.reset();
        self.inner.hub.publish(SyncEvent::Logout);
        handle
    }

    /// Records a failed silent (background) authentication as
    /// `silent_auth_failed` and publishes `SilentAuthError`.
    pub fn report_silent_auth_error(&self, message: impl Into<String>) {
        let detail = ErrorInfo::new(
            codes::SILENT_AUTH_FAILED,
            "Silent authentication failed",
            message,
        );
        self.inner.state.update(|s| s.error = Some(detail.clone()));
        self.inner.hub.publish(SyncEvent::SilentAuthError { detail });
    }

    /// Asks the auth collaborator for a fresh token.
    ///
    /// Without a token there is nothing to refresh: a `no_token` error is
    /// recorded in state and `false` is returned.
    pub fn request_refresh(&self) -> bool {
        if self.inner.state.read(|s| s.access_token.is_none()) {
            self.set_error(Some(ErrorInfo::from_error(
                codes::NO_TOKEN,
                "No token available to refresh",
                &InkpostError::validation("session has no access token"),
            )));
            return false;
        }
        self.inner.hub.publish(SyncEvent::RefreshRequested);
        true
    }

    // ============================================================================
    // Cross-instance sync
    // ============================================================================

    /// Re-pulls the record for the current identity. Returns whether a
    /// record was adopted.
    pub async fn pull_remote(&self) -> bool {
        let key = self.identity_key();
        self.pull(&key).await
    }

    /// Probes the remote backend. Leaving fallback mode pushes the local
    /// state once.
    pub async fn check_connectivity(&self) -> ConnectivityState {
        if self.inner.monitor.probe(self.inner.remote.as_ref()).await == Some(Transition::Restored) {
            Arc::clone(&self.inner).push_state().await;
        }
        self.inner.monitor.state()
    }

    /// Applies a hub signal. Called by the background listener; public so
    /// hosts without a listener can forward signals themselves.
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
            SyncEvent::AuthStateUpdated {
                origin, identity, ..
            } if *origin != self.inner.instance_id => {
                let local = self.identity_key();
                let remote = IdentityKey::from(identity.as_str());
                // Anonymous records stay private to the instance that wrote them.
                if local == remote || (local.is_anonymous() && !remote.is_anonymous()) {
                    tracing::debug!("[{}] Sibling {} updated {}, re-pulling", NAME, origin, identity);
                    self.pull(&remote).await;
                }
            }
            _ => {}
        }
    }

    // ============================================================================
    // Internals
    // ============================================================================

    fn mutate(&self, f: impl FnOnce(&mut SessionState)) -> SyncHandle {
        let previous = self.identity_key();
        self.inner.state.update(f);
        self.inner.note_departure(previous);
        self.sync()
    }

    fn sync(&self) -> SyncHandle {
        if !self.inner.should_sync() {
            return SyncHandle::skipped();
        }
        SyncHandle::spawn(Arc::clone(&self.inner).push_state())
    }

    fn apply_token(&self, info: TokenInfo, extra: impl FnOnce(&mut SessionState)) -> SyncHandle {
        let inner = &self.inner;
        let now = inner.clock.now();
        let expires_at = info.expires_at;
        let previous = self.identity_key();
        inner.state.update(|s| {
            extra(s);
            s.set_token(&info);
            if expires_at > now {
                s.authenticated = true;
            }
        });
        inner.note_departure(previous);

        let handle = if inner.should_sync() {
            let key = self.identity_key();
            let ttl_secs = info.remaining_secs(now);
            let task_inner = Arc::clone(inner);
            SyncHandle::spawn(async move {
                if ttl_secs > 0 {
                    let record = json!({ "token": info.token, "expiresAt": info.expires_at });
                    if let Err(e) = task_inner
                        .remote
                        .set(Namespace::Token, key.as_str(), record, ttl_secs)
                        .await
                    {
                        task_inner.monitor.record_failure(&e);
                        return;
                    }
                }
                task_inner.push_state().await;
            })
        } else {
            SyncHandle::skipped()
        };

        inner.scheduler.schedule(expires_at, now);
        handle
    }

    /// Adopts a remote record under the sync guard, then checks its token.
    fn adopt(&self, record: SessionState) {
        let inner = &self.inner;
        {
            let _guard = inner.guard.enter();
            inner.state.update(|s| s.adopt(record));
        }

        let now = inner.clock.now();
        match inner.state.read(|s| s.token_info()) {
            Some(info) if info.expires_at <= now => {
                tracing::info!("[{}] Persisted token expired at {}", NAME, info.expires_at);
                inner.scheduler.cancel();
                self.set_authenticated(false);
                self.set_error(Some(ErrorInfo::new(
                    codes::SESSION_EXPIRED,
                    "Session expired",
                    format!("token expired at {}", info.expires_at),
                )));
                inner.hub.publish(SyncEvent::SessionExpired);
            }
            Some(info) => {
                inner.scheduler.schedule(info.expires_at, now);
            }
            None => inner.scheduler.cancel(),
        }
    }

    async fn pull(&self, key: &IdentityKey) -> bool {
        if self.inner.monitor.is_fallback() {
            return false;
        }
        match self.inner.load_record(key).await {
            Ok(Some(record)) => {
                self.adopt(record);
                true
            }
            Ok(None) => {
                let _guard = self.inner.guard.enter();
                self.inner.scheduler.cancel();
                self.inner.state.update(|s| s.adopt(SessionState::default()));
                false
            }
            Err(e) => {
                self.inner.monitor.record_failure(&e);
                false
            }
        }
    }

    fn ensure_listener(&self) {
        let mut slot = self.inner.lock_listener();
        if slot.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return;
        }
        let subscription = self.inner.hub.subscribe(&[Topic::AuthState, Topic::Connectivity]);
        *slot = spawn_listener(
            NAME,
            subscription,
            Arc::downgrade(&self.inner),
            |inner: Arc<SessionInner>, event| async move {
                SessionStore { inner }.handle_signal(&event).await;
            },
        );
    }
}

impl IdentitySource for SessionStore {
    /// The signed-in user's id, else the instance's anonymous key.
    fn identity_key(&self) -> IdentityKey {
        self.inner.current_key()
    }
}

impl SessionInner {
    fn should_sync(&self) -> bool {
        !self.guard.is_active() && !self.monitor.is_fallback()
    }

    fn lock_listener(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.listener.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_departed(&self) -> std::sync::MutexGuard<'_, Vec<IdentityKey>> {
        self.departed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues `previous` for clearing when a mutation moved the state away
    /// from that signed-in identity.
    fn note_departure(&self, previous: IdentityKey) {
        if previous.is_anonymous() || previous == self.current_key() {
            return;
        }
        let mut departed = self.lock_departed();
        if !departed.contains(&previous) {
            tracing::debug!("[{}] Identity {} left, clearing its records on next push", NAME, previous);
            departed.push(previous);
        }
    }

    async fn delete_records(&self, key: &IdentityKey) -> inkpost_core::error::Result<()> {
        for namespace in [Namespace::AuthState, Namespace::Token] {
            self.remote.delete(namespace, key.as_str()).await?;
        }
        Ok(())
    }

    /// Deletes the records of every departed identity and announces each,
    /// so siblings still on that identity re-pull and sign out too.
    ///
    /// Returns `false` on a remote failure; unprocessed keys stay queued.
    async fn clear_departed(&self) -> bool {
        let current = self.current_key();
        let mut pending = std::mem::take(&mut *self.lock_departed()).into_iter();
        while let Some(key) = pending.next() {
            // Signed back in: the upcoming write replaces the record.
            if key == current {
                continue;
            }
            if let Err(e) = self.delete_records(&key).await {
                self.lock_departed().extend(std::iter::once(key).chain(pending));
                self.monitor.record_failure(&e);
                return false;
            }
            tracing::info!("[{}] Cleared records of departed identity {}", NAME, key);
            self.publish_updated(&key);
        }
        true
    }

    fn current_key(&self) -> IdentityKey {
        self.state
            .read(|s| IdentityKey::resolve(s.user_id(), &self.fallback_key))
    }

    async fn load_record(
        &self,
        key: &IdentityKey,
    ) -> inkpost_core::error::Result<Option<SessionState>> {
        let Some(value) = self.remote.get(Namespace::AuthState, key.as_str()).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!("[{}] Ignoring unreadable session record for {}: {}", NAME, key, e);
                Ok(None)
            }
        }
    }

    /// Writes the persisted view of the current state and announces it.
    /// Records of departed identities are cleared first.
    async fn push_state(self: Arc<Self>) {
        if self.monitor.is_fallback() || !self.clear_departed().await {
            return;
        }
        let key = self.current_key();
        let record = match serde_json::to_value(self.state.read(|s| s.persisted())) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!("[{}] Failed to serialize session state: {}", NAME, e);
                return;
            }
        };

        match self
            .remote
            .set(Namespace::AuthState, key.as_str(), record, self.auth_state_ttl_secs)
            .await
        {
            Ok(()) => {
                tracing::trace!("[{}] Pushed session state for {}", NAME, key);
                self.publish_updated(&key);
            }
            Err(e) => {
                self.monitor.record_failure(&e);
            }
        }
    }

    fn publish_updated(&self, key: &IdentityKey) {
        self.hub.publish(SyncEvent::AuthStateUpdated {
            origin: self.instance_id,
            identity: key.to_string(),
            timestamp: self.clock.now(),
        });
    }
}
