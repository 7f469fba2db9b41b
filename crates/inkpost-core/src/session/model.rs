//! Session domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error_info::ErrorInfo;

/// Profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Stable user identifier; doubles as the identity key once signed in.
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            picture: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = Some(picture.into());
        self
    }
}

/// Access token together with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenInfo {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Seconds left before expiry, zero when already expired.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        (self.expires_at - now).num_seconds().max(0) as u64
    }
}

/// Authentication/session state.
///
/// The whole struct is the remote record for the `auth_state` namespace.
/// Fields are public for reading snapshots; mutation goes through the
/// session store actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Raw authenticated flag. See [`SessionState::is_authenticated`].
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub loading: bool,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// UI hint: a login popup is currently open.
    #[serde(default)]
    pub popup_open: bool,
    /// Path to resume navigation after a login round-trip.
    #[serde(default)]
    pub redirect_path: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff the flag is set, a token is present and `now < expires_at`.
    pub fn is_authenticated(&self, now: DateTime<Utc>) -> bool {
        self.authenticated && self.access_token.is_some() && !self.token_expired(now)
    }

    /// True when the expiry is absent or not in the future.
    pub fn token_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now,
            None => true,
        }
    }

    /// Sets the raw flag. Clearing it drops user, token and expiry together.
    pub fn set_authenticated(&mut self, value: bool) {
        self.authenticated = value;
        if !value {
            self.user = None;
            self.access_token = None;
            self.expires_at = None;
        }
    }

    pub fn set_token(&mut self, info: &TokenInfo) {
        self.access_token = Some(info.token.clone());
        self.expires_at = Some(info.expires_at);
    }

    /// Current token as a [`TokenInfo`], if both token and expiry are set.
    pub fn token_info(&self) -> Option<TokenInfo> {
        match (&self.access_token, self.expires_at) {
            (Some(token), Some(expires_at)) => Some(TokenInfo::new(token.clone(), expires_at)),
            _ => None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    /// The record written to the remote backend. Local UI state (loading,
    /// error, popup) is not shared between instances.
    pub fn persisted(&self) -> SessionState {
        SessionState {
            loading: false,
            error: None,
            popup_open: false,
            ..self.clone()
        }
    }

    /// Replaces the shared fields with `record`, keeping local UI state.
    pub fn adopt(&mut self, record: SessionState) {
        *self = SessionState {
            loading: self.loading,
            error: self.error.take(),
            popup_open: self.popup_open,
            ..record
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn authenticated_state(now: DateTime<Utc>) -> SessionState {
        let mut state = SessionState::new();
        state.user = Some(UserProfile::new("u1", "A"));
        state.set_token(&TokenInfo::new("t", now + Duration::hours(1)));
        state.set_authenticated(true);
        state
    }

    #[test]
    fn test_default_is_unauthenticated() {
        let state = SessionState::new();
        assert!(!state.is_authenticated(Utc::now()));
        assert!(state.token_expired(Utc::now()));
        assert!(state.user.is_none());
    }

    #[test]
    fn test_is_authenticated_requires_flag_token_and_future_expiry() {
        let now = Utc::now();
        let state = authenticated_state(now);
        assert!(state.is_authenticated(now));

        let mut no_flag = state.clone();
        no_flag.authenticated = false;
        assert!(!no_flag.is_authenticated(now));

        let mut no_token = state.clone();
        no_token.access_token = None;
        assert!(!no_token.is_authenticated(now));

        // Expiry equal to now counts as expired.
        assert!(!state.is_authenticated(now + Duration::hours(1)));
    }

    #[test]
    fn test_clearing_flag_clears_user_and_token_together() {
        let now = Utc::now();
        let mut state = authenticated_state(now);
        state.redirect_path = Some("/blog".to_string());

        state.set_authenticated(false);
        state.set_authenticated(false);

        assert!(state.user.is_none());
        assert!(state.access_token.is_none());
        assert!(state.expires_at.is_none());
        assert_eq!(state.redirect_path.as_deref(), Some("/blog"));
    }

    #[test]
    fn test_serializes_camel_case() {
        let now = Utc::now();
        let state = authenticated_state(now);
        let value = serde_json::to_value(&state).unwrap();
        assert!(value.get("accessToken").is_some());
        assert!(value.get("redirectPath").is_some());

        let back: SessionState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_adopt_keeps_local_ui_state() {
        let now = Utc::now();
        let mut local = SessionState::new();
        local.loading = true;
        local.popup_open = true;

        let mut record = authenticated_state(now);
        record.popup_open = false;
        record.error = Some(ErrorInfo::new("x", "remote error", ""));

        local.adopt(record.persisted());

        assert!(local.loading);
        assert!(local.popup_open);
        assert!(local.error.is_none());
        assert_eq!(local.user_id(), Some("u1"));
        assert!(local.is_authenticated(now));
    }

    #[test]
    fn test_remaining_secs_saturates() {
        let now = Utc::now();
        let info = TokenInfo::new("t", now - Duration::seconds(10));
        assert_eq!(info.remaining_secs(now), 0);
        let info = TokenInfo::new("t", now + Duration::seconds(90));
        assert_eq!(info.remaining_secs(now), 90);
    }
}
