//! Health monitor error types.

use thiserror::Error;

/// Errors returned by `HealthMonitor` operations.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    #[error(transparent)]
    State(#[from] peerwatch_state::StateError),

    #[error(transparent)]
    Tunnel(#[from] peerwatch_tunnel::TunnelError),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
