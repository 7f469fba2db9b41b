//! Error types for Inkpost.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the entire Inkpost workspace.
///
/// Variants follow the failure taxonomy of the stores: remote-backend
/// failures are always absorbed by the stores, origin-service failures are
/// surfaced to callers, and validation failures are recorded in state.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum InkpostError {
    /// Remote key-value backend error (network/availability)
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Origin configuration service error
    #[error("Origin service error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Origin { status: Option<u16>, message: String },

    /// Validation/state error
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl InkpostError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a Remote error
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote(message.into())
    }

    /// Creates an Origin error
    pub fn origin(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Origin {
            status,
            message: message.into(),
        }
    }

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a remote backend error
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Check if this is an origin service error
    pub fn is_origin(&self) -> bool {
        matches!(self, Self::Origin { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a config error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for InkpostError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for InkpostError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for InkpostError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for InkpostError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for InkpostError {
    fn from(err: reqwest::Error) -> Self {
        Self::Origin {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, InkpostError>`.
pub type Result<T> = std::result::Result<T, InkpostError>;
