//! Error taxonomy for the map core
//!
//! None of these are fatal: callers log them or turn them into a notice.

use thiserror::Error;

/// Failures talking to the remote document store or the auth collaborator
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// Transport failure (DNS, connect, timeout, ...)
    #[error("Network error: {0}")]
    Network(String),
    /// Backend answered with a non-success status
    #[error("Backend returned {status}: {body}")]
    Http { status: u16, body: String },
    /// Backend payload could not be understood
    #[error("Failed to decode backend response: {0}")]
    Decode(String),
    /// An operation needed a session that does not exist
    #[error("Not signed in")]
    NotAuthenticated,
    /// Write refused by the backend
    #[error("Write rejected: {0}")]
    Rejected(String),
    /// The store has been shut down
    #[error("Store closed")]
    Closed,
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StoreError::Decode(e.to_string())
        } else {
            StoreError::Network(e.to_string())
        }
    }
}

/// Failures of the one-shot position fetch
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PositionError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Position unavailable: {0}")]
    Unavailable(String),
    #[error("Position request timed out")]
    Timeout,
    #[error("Position request failed: {0}")]
    Other(String),
}

/// Failures of a modal prompt
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DialogError {
    /// `show` was called while a prompt is still awaiting its answer
    #[error("Dialog is already visible")]
    AlreadyVisible,
    /// The prompt was torn down without an answer
    #[error("Dialog closed without an answer")]
    Closed,
}

/// A device collaborator call failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Platform call failed: {0}")]
pub struct PlatformError(pub String);

impl PlatformError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
