//! Error types for the Courier core.
//!
//! [`BotError`] is the single error type that flows out of listeners. Its
//! [`kind`](BotError::kind) decides how the dispatch boundary answers the
//! user: warnings and errors become replies, faults are logged and answered
//! with a generic failure message.

use thiserror::Error;

// =============================================================================
// Collaborator Errors
// =============================================================================

/// Errors reported by the remote chat platform.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// The referenced remote entity does not exist.
    #[error("{what} not found")]
    NotFound {
        /// Human readable description of the missing entity.
        what: String,
    },

    /// The platform rejected the request.
    #[error("platform request failed: {0}")]
    Request(String),

    /// The gateway is not connected.
    #[error("platform is not connected")]
    NotConnected,
}

impl PlatformError {
    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a request failure.
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }
}

/// Errors reported by the settings store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Reading or writing the backing medium failed.
    #[error("settings I/O error: {0}")]
    Io(String),

    /// The persisted data could not be (de)serialised.
    #[error("settings serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// BotError
// =============================================================================

/// How a [`BotError`] is presented once it reaches a dispatch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Recoverable misuse, shown with a caution tone.
    Warning,
    /// The request cannot proceed, shown with an error tone.
    Error,
    /// Internal failure, logged with full context and answered generically.
    Fault,
}

/// The error type returned by every listener action.
#[derive(Debug, Clone, Error)]
pub enum BotError {
    /// Recoverable misuse, e.g. toggling a component into its current state.
    #[error("{0}")]
    Warning(String),

    /// The operation cannot proceed, e.g. a missing destination channel.
    #[error("{0}")]
    Error(String),

    /// The actor failed the listener's authorization check.
    #[error("You do not have permission to do that")]
    PermissionDenied,

    /// A platform call failed.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// A settings store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Any other internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// Creates a warning.
    pub fn warning(msg: impl Into<String>) -> Self {
        Self::Warning(msg.into())
    }

    /// Creates a user-facing error.
    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error(msg.into())
    }

    /// Creates an internal fault.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns how this error should be presented.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Warning(_) | Self::PermissionDenied => ErrorKind::Warning,
            Self::Error(_) => ErrorKind::Error,
            Self::Platform(_) | Self::Store(_) | Self::Internal(_) => ErrorKind::Fault,
        }
    }

    /// Returns `true` for warnings and errors, `false` for faults.
    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::Fault
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for listener actions and domain operations.
pub type BotResult<T> = Result<T, BotError>;

/// Result type for platform calls.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Result type for settings store calls.
pub type StoreResult<T> = Result<T, StoreError>;
