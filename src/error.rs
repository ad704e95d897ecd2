//! Error types for offense-watch

use std::path::PathBuf;
use thiserror::Error;

/// Why a notification could not be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyFailure {
    /// The transport refused our credentials
    Auth,
    /// The transport could not be reached or the connection dropped
    Connectivity,
    /// The transport accepted the connection but rejected the message
    Rejected,
    /// The message itself could not be assembled (bad address, etc.)
    Build,
}

impl std::fmt::Display for NotifyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyFailure::Auth => write!(f, "auth"),
            NotifyFailure::Connectivity => write!(f, "connectivity"),
            NotifyFailure::Rejected => write!(f, "rejected"),
            NotifyFailure::Build => write!(f, "build"),
        }
    }
}

/// Errors that can occur while tracking and notifying offenses
#[derive(Debug, Error)]
pub enum WatchError {
    /// Event source unreachable, HTTP failure, or undecodable response
    #[error("Fetch error during {operation}: {reason}")]
    Fetch { operation: String, reason: String },

    /// Cursor or failure-queue file is not in the expected format
    #[error("Corrupt state in {}: {reason}", path.display())]
    CorruptState { path: PathBuf, reason: String },

    /// Mail transport failure
    #[error("Notify error ({kind}): {reason}")]
    Notify { kind: NotifyFailure, reason: String },

    /// Missing or invalid configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A bounded external call did not complete in time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML for our schema
    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

impl WatchError {
    pub(crate) fn fetch(operation: impl Into<String>, reason: impl ToString) -> Self {
        WatchError::Fetch {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn notify(kind: NotifyFailure, reason: impl ToString) -> Self {
        WatchError::Notify {
            kind,
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for offense-watch operations
pub type Result<T> = std::result::Result<T, WatchError>;
