//! Error types for engine sessions and the views built on top of them.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Error type for session, view and resolution operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The engine could not be started, or the session is no longer usable.
    #[error("Analysis engine unavailable: {0}")]
    EngineUnavailable(String),

    /// A reply that should have been JSON (or hex) could not be decoded.
    #[error("Malformed reply to `{command}`: {message}")]
    Protocol { command: String, message: String },

    /// The value handed to the session is not something it can open.
    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    /// Address resolution below the lowest known flag.
    #[error("No flag at or below {0:#x}")]
    NoPrecedingFlag(u64),

    /// A path source that does not exist on disk.
    #[error("Binary not found at {0}")]
    MissingBinary(PathBuf),

    /// The engine did not answer within the configured bound.
    ///
    /// The session that produced this error is poisoned: the engine process has been
    /// killed because its reply stream can no longer be matched to commands.
    #[error("Command `{command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    /// Pipe or filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub(crate) fn protocol(command: &str, message: impl ToString) -> Self {
        SessionError::Protocol { command: command.to_string(), message: message.to_string() }
    }
}

/// Convenience result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
