//! Identity keys.
//!
//! Every remote record is scoped by an identity key: the signed-in user's id
//! when there is one, otherwise a random per-load session id. Anonymous
//! sessions therefore get isolated, disposable storage.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ANONYMOUS_PREFIX: &str = "anon-";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Key for a signed-in user.
    pub fn user(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random key for an anonymous session.
    pub fn anonymous() -> Self {
        Self(format!("{}{}", ANONYMOUS_PREFIX, Uuid::new_v4()))
    }

    /// Resolves the key: the user id if present, else the anonymous fallback.
    pub fn resolve(user_id: Option<&str>, anonymous: &IdentityKey) -> Self {
        match user_id {
            Some(id) if !id.is_empty() => Self::user(id),
            _ => anonymous.clone(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.starts_with(ANONYMOUS_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Anything able to report the identity key currently in effect.
///
/// The session store implements this so the preferences store can scope its
/// records by the signed-in user.
pub trait IdentitySource: Send + Sync {
    fn identity_key(&self) -> IdentityKey;
}
