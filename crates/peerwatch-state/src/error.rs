//! Error types for the Peerwatch state crate.

use thiserror::Error;

/// Result type alias for state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while reading or persisting state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read settings file: {0}")]
    Read(String),

    #[error("failed to write settings file: {0}")]
    Write(String),

    #[error("malformed settings file at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("invalid interface name: {0}")]
    InvalidInterface(String),

    #[error("invalid peer identifier")]
    InvalidPeer,
}
