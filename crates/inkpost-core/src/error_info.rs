//! Structured error records held in store state.
//!
//! Unlike [`InkpostError`], an [`ErrorInfo`] is plain data: it is stored in
//! the `error` field of a store, serialized with it, and rendered by the UI
//! as an inline banner.

use serde::{Deserialize, Serialize};

use crate::error::InkpostError;

/// Well-known error codes.
pub mod codes {
    pub const INIT_FAILED: &str = "init_failed";
    pub const ORIGIN_ERROR: &str = "origin_error";
    pub const CONNECTION_FAILED: &str = "connection_failed";
    pub const NO_TOKEN: &str = "no_token";
    pub const SESSION_EXPIRED: &str = "session_expired";
    pub const LOGIN_FAILED: &str = "login_failed";
    pub const SILENT_AUTH_FAILED: &str = "silent_auth_failed";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    /// Machine readable code (see [`codes`]).
    pub code: String,
    /// Short human readable summary.
    pub description: String,
    /// Underlying error message, if any.
    #[serde(default)]
    pub message: String,
}

impl ErrorInfo {
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            message: message.into(),
        }
    }

    /// Builds an error record from a caught [`InkpostError`].
    pub fn from_error(
        code: impl Into<String>,
        description: impl Into<String>,
        err: &InkpostError,
    ) -> Self {
        Self::new(code, description, err.to_string())
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code == code
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "[{}] {}", self.code, self.description)
        } else {
            write!(f, "[{}] {}: {}", self.code, self.description, self.message)
        }
    }
}
