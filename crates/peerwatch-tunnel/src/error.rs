//! Tunnel boundary error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while querying or commanding the tunnel layer.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("invalid argument: {0}")]
    Invalid(#[from] peerwatch_state::StateError),

    #[error("unsupported show field: {0}")]
    UnsupportedField(String),

    #[error("{0} binary not found in allowed paths")]
    ExecutableNotFound(String),

    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with status {status}: {stderr}")]
    Failed {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("malformed {program} output: {reason}")]
    Malformed { program: String, reason: String },
}

pub type TunnelResult<T> = Result<T, TunnelError>;
