//! Signals exchanged between stores, sibling instances and the auth plugin.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error_info::ErrorInfo;
use crate::settings::Settings;

/// Topic a signal is published on. Subscribers filter by topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Login/logout lifecycle.
    Auth,
    /// Token expiry and refresh requests.
    Token,
    /// Session state written by some instance.
    AuthState,
    /// Settings written by some instance.
    Settings,
    /// Remote backend reachability.
    Connectivity,
}

/// A signal on the local broadcast hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    LoginSuccess {
        identity: String,
    },
    LoginError {
        detail: ErrorInfo,
    },
    Logout,
    /// The token is expired or inside the refresh margin.
    TokenExpired,
    /// The refresh timer fired; the auth plugin should refresh the token.
    RefreshRequested,
    /// A persisted session was found with an expired token.
    SessionExpired,
    SilentAuthError {
        detail: ErrorInfo,
    },
    ConnectivityFailed,
    ConnectivityRestored,
    /// Marker telling siblings to re-pull the session record.
    AuthStateUpdated {
        origin: Uuid,
        identity: String,
        timestamp: DateTime<Utc>,
    },
    /// Marker telling siblings to re-pull settings.
    SettingsUpdated {
        origin: Uuid,
        identity: String,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        settings: Option<Settings>,
    },
}

impl SyncEvent {
    pub fn topic(&self) -> Topic {
        match self {
            SyncEvent::LoginSuccess { .. }
            | SyncEvent::LoginError { .. }
            | SyncEvent::Logout
            | SyncEvent::SessionExpired
            | SyncEvent::SilentAuthError { .. } => Topic::Auth,
            SyncEvent::TokenExpired | SyncEvent::RefreshRequested => Topic::Token,
            SyncEvent::AuthStateUpdated { .. } => Topic::AuthState,
            SyncEvent::SettingsUpdated { .. } => Topic::Settings,
            SyncEvent::ConnectivityFailed | SyncEvent::ConnectivityRestored => {
                Topic::Connectivity
            }
        }
    }

    /// Instance that published a state marker, if this is one.
    pub fn origin(&self) -> Option<Uuid> {
        match self {
            SyncEvent::AuthStateUpdated { origin, .. }
            | SyncEvent::SettingsUpdated { origin, .. } => Some(*origin),
            _ => None,
        }
    }
}
