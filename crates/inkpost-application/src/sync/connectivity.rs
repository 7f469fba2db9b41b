//! Connectivity monitor.
//!
//! Tracks whether the remote backend is reachable for one store. While the
//! monitor is disconnected the store runs in local-fallback mode: no remote
//! reads or writes are attempted.
//!
//! ```text
//!              caught failure / ConnectivityFailed
//!   Connected ───────────────────────────────────────▶ Disconnected
//!       ▲                                                   │
//!       └──────────── ConnectivityRestored ─────────────────┘
//!                  (store then pushes local state once)
//! ```
//!
//! `Probing` is only observable while an explicit [`ConnectivityMonitor::probe`]
//! is waiting on the backend health check.

use inkpost_core::error::InkpostError;
use inkpost_core::remote::RemoteStore;
use inkpost_core::signal::SyncEvent;
use inkpost_infrastructure::BroadcastHub;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Connected,
    Probing,
    Disconnected,
}

/// A state change caused by a failure, a signal or a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Failed,
    Restored,
}

#[derive(Debug, Default)]
struct MonitorState {
    fallback: bool,
    probing: bool,
}

pub struct ConnectivityMonitor {
    name: &'static str,
    hub: BroadcastHub,
    state: Mutex<MonitorState>,
}

impl ConnectivityMonitor {
    pub fn new(name: &'static str, hub: BroadcastHub) -> Self {
        Self {
            name,
            hub,
            state: Mutex::new(MonitorState::default()),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MonitorState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub fn state(&self) -> ConnectivityState {
        self.with_state(|s| {
            if s.probing {
                ConnectivityState::Probing
            } else if s.fallback {
                ConnectivityState::Disconnected
            } else {
                ConnectivityState::Connected
            }
        })
    }

    /// True while local-fallback mode is active.
    pub fn is_fallback(&self) -> bool {
        self.with_state(|s| s.fallback)
    }

    /// Records a caught remote failure. On transition the failure is logged
    /// and `ConnectivityFailed` is published so sibling stores follow.
    pub fn record_failure(&self, err: &InkpostError) -> Option<Transition> {
        let transition = self.set_fallback(true);
        if transition.is_some() {
            tracing::warn!(
                "[{}] Remote backend unreachable, switching to local-fallback mode: {}",
                self.name,
                err
            );
            self.hub.publish(SyncEvent::ConnectivityFailed);
        } else {
            tracing::debug!("[{}] Remote operation failed while in fallback: {}", self.name, err);
        }
        transition
    }

    /// Applies an external `ConnectivityFailed` signal. Does not republish.
    pub fn apply_failed_signal(&self) -> Option<Transition> {
        let transition = self.set_fallback(true);
        if transition.is_some() {
            tracing::info!("[{}] Connectivity failed signal received, entering fallback", self.name);
        }
        transition
    }

    /// Applies an external `ConnectivityRestored` signal. Does not republish.
    ///
    /// Returns `Some(Transition::Restored)` when the store left fallback mode
    /// and owes the backend one corrective push.
    pub fn apply_restored_signal(&self) -> Option<Transition> {
        let transition = self.set_fallback(false);
        if transition.is_some() {
            tracing::info!("[{}] Connectivity restored, leaving fallback", self.name);
        }
        transition
    }

    /// Runs a backend health check and publishes the signal matching any
    /// resulting transition.
    pub async fn probe(&self, remote: &dyn RemoteStore) -> Option<Transition> {
        self.with_state(|s| s.probing = true);
        let healthy = match remote.health_check().await {
            Ok(status) => status.healthy,
            Err(e) => {
                tracing::debug!("[{}] Health check failed: {}", self.name, e);
                false
            }
        };
        self.with_state(|s| s.probing = false);

        let transition = self.set_fallback(!healthy);
        match transition {
            Some(Transition::Restored) => {
                tracing::info!("[{}] Health check passed, leaving fallback", self.name);
                self.hub.publish(SyncEvent::ConnectivityRestored);
            }
            Some(Transition::Failed) => {
                tracing::warn!("[{}] Health check failed, entering fallback", self.name);
                self.hub.publish(SyncEvent::ConnectivityFailed);
            }
            None => {}
        }
        transition
    }

    fn set_fallback(&self, fallback: bool) -> Option<Transition> {
        self.with_state(|s| {
            if s.fallback == fallback {
                None
            } else {
                s.fallback = fallback;
                Some(if fallback {
                    Transition::Failed
                } else {
                    Transition::Restored
                })
            }
        })
    }
}
