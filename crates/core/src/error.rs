//! Error types shared by every targetsync crate.
//!
//! Errors are explicit and typed. Backends report failures through
//! [`Error::Backend`]; the reconciler rewraps them into the variant that
//! names the step that failed so the log line says what was being done.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for targetsync operations.
#[derive(Debug, Error)]
pub enum Error {
    // Backend errors
    #[error("{backend} backend error: {reason}")]
    Backend { backend: String, reason: String },

    // Run-terminating failures
    #[error("failed to acquire lock: {reason}")]
    LockFailed { reason: String },

    #[error("failed to subscribe to target source: {reason}")]
    SubscribeFailed { reason: String },

    #[error("failed to read destination targets: {reason}")]
    DestinationRead { reason: String },

    #[error("destination {op} failed: {reason}")]
    DestinationWrite { op: String, reason: String },

    #[error("target source stream ended")]
    SourceClosed,

    #[error("election stream ended")]
    ElectionClosed,

    #[error("operation cancelled")]
    Cancelled,

    // Configuration errors
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    #[error("failed to parse config '{path}': {reason}")]
    ConfigParseFailed { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a backend error.
    pub fn backend(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Create a lock acquisition error.
    pub fn lock_failed(reason: impl ToString) -> Self {
        Self::LockFailed {
            reason: reason.to_string(),
        }
    }

    /// Create a source subscription error.
    pub fn subscribe_failed(reason: impl ToString) -> Self {
        Self::SubscribeFailed {
            reason: reason.to_string(),
        }
    }

    /// Create a destination read error.
    pub fn destination_read(reason: impl ToString) -> Self {
        Self::DestinationRead {
            reason: reason.to_string(),
        }
    }

    /// Create a destination write error for the named operation.
    pub fn destination_write(op: impl Into<String>, reason: impl ToString) -> Self {
        Self::DestinationWrite {
            op: op.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a config parse error.
    pub fn config_parse_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ConfigParseFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Report this error as a lock failure unless it already is one or is a cancellation.
    #[must_use]
    pub fn into_lock_failed(self) -> Self {
        match self {
            Self::LockFailed { .. } | Self::Cancelled => self,
            other => Self::lock_failed(other),
        }
    }

    /// Report this error as a subscription failure unless it already is one or is a cancellation.
    #[must_use]
    pub fn into_subscribe_failed(self) -> Self {
        match self {
            Self::SubscribeFailed { .. } | Self::Cancelled => self,
            other => Self::subscribe_failed(other),
        }
    }

    /// Whether this error is the cancellation of a scope rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
