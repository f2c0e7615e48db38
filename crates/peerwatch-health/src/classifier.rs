//! Status classification from handshake age and probe outcome.
//!
//! Classification is two-phase. `gate` decides from the handshake alone
//! whether a probe is worth sending; `classify` settles the status once the
//! probe has answered. `apply` writes the verdict into a record.

use std::time::Duration;

use peerwatch_state::{PeerHealthRecord, PeerStatus};

/// Handshakes younger than this mean the tunnel is live.
pub const ONLINE_WINDOW: Duration = Duration::from_secs(3 * 60);

/// Handshakes older than this mean the peer is gone.
pub const RECENT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Outcome of the pre-probe gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Final status known without probing.
    Skip(PeerStatus),
    /// Send a probe, then call `classify` with this age.
    Probe(Duration),
}

pub fn gate(age: Option<Duration>) -> Gate {
    match age {
        None => Gate::Skip(PeerStatus::Unknown),
        Some(age) if age > RECENT_WINDOW => Gate::Skip(PeerStatus::Offline),
        Some(age) => Gate::Probe(age),
    }
}

/// Status of a probed peer.
pub fn classify(age: Duration, probe_success: bool) -> PeerStatus {
    if age >= ONLINE_WINDOW {
        PeerStatus::Recent
    } else if probe_success {
        PeerStatus::Online
    } else {
        PeerStatus::Unpingable
    }
}

/// Store `status` on the record and update `is_pingable`.
///
/// `probe` is the probe result when one was sent this cycle. Returns
/// whether the peer counts as pingable for this cycle.
pub fn apply(record: &mut PeerHealthRecord, status: PeerStatus, probe: Option<bool>) -> bool {
    record.status = status;
    match status {
        PeerStatus::Online => {
            record.is_pingable = true;
            true
        }
        PeerStatus::Unpingable | PeerStatus::Offline => {
            record.is_pingable = false;
            false
        }
        PeerStatus::Recent => {
            if probe == Some(true) {
                record.is_pingable = true;
                true
            } else {
                false
            }
        }
        // Unknown keeps the last known pingability.
        PeerStatus::Unknown => false,
    }
}
