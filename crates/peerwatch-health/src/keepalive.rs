//! Persistent-keepalive reconciliation.

use tracing::{debug, warn};

use peerwatch_tunnel::{InterfaceState, PeerReport, TunnelSource};

/// Counts from one reconciliation pass over an interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepaliveReport {
    pub checked: u32,
    pub corrected: u32,
    pub failed: u32,
}

/// Whether a peer's live keepalive differs from the desired one.
/// A disabled keepalive (`None`) always differs.
pub fn needs_correction(current: Option<u16>, desired: u16) -> bool {
    current != Some(desired)
}

/// Bring every peer's persistent-keepalive to `desired`.
///
/// Best effort: a failed correction is logged and counted, and the
/// remaining peers are still processed.
pub async fn reconcile_keepalive(
    tunnels: &dyn TunnelSource,
    interface: &InterfaceState,
    peers: &[PeerReport],
    desired: u16,
) -> KeepaliveReport {
    let mut report = KeepaliveReport::default();

    for peer in peers {
        report.checked += 1;
        if !needs_correction(peer.persistent_keepalive, desired) {
            continue;
        }
        match tunnels
            .set_keepalive(&interface.name, interface.protocol, &peer.public_key, desired)
            .await
        {
            Ok(()) => {
                report.corrected += 1;
                debug!(
                    interface = %interface.name,
                    peer = %peer.public_key,
                    from = ?peer.persistent_keepalive,
                    to = desired,
                    "keepalive corrected"
                );
            }
            Err(e) => {
                report.failed += 1;
                warn!(
                    interface = %interface.name,
                    peer = %peer.public_key,
                    error = %e,
                    "failed to set keepalive"
                );
            }
        }
    }

    report
}
