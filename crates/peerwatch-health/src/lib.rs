//! peerwatch-health — peer health monitoring for WireGuard tunnels.
//!
//! Classifies every peer from its latest handshake, confirms live peers
//! with an ICMP probe, keeps persistent-keepalive values converged, and
//! tracks endpoint roaming.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor
//!   ├── Background worker (warm-up, cycle, sleep until next interval)
//!   │   ├── TunnelSource → interfaces, peers
//!   │   ├── reconcile_keepalive() per enabled interface
//!   │   ├── parse_handshake() → gate() → Prober → classify()
//!   │   └── evict records for peers no longer reported
//!   ├── Query facade (peer, overview, stats, forced probe/cycle)
//!   └── InterfaceConfigStore (per-interface settings)
//! ```
//!
//! # Status policy
//!
//! | Handshake age | Probe | Status |
//! |---|---|---|
//! | never | not sent | `Unknown` |
//! | over 15 min | not sent | `Offline` |
//! | 3 to 15 min | sent | `Recent` |
//! | under 3 min | answered | `Online` |
//! | under 3 min | unanswered | `Unpingable` |
//!
//! Recent peers are still probed: the outbound packet makes a roaming
//! peer answer from its new endpoint.

pub mod address;
pub mod classifier;
pub mod error;
pub mod handshake;
pub mod keepalive;
pub mod monitor;
pub mod probe;

pub use address::vpn_address;
pub use classifier::{Gate, ONLINE_WINDOW, RECENT_WINDOW, classify, gate};
pub use error::{MonitorError, MonitorResult};
pub use handshake::{HandshakeAge, parse_handshake};
pub use keepalive::{KeepaliveReport, reconcile_keepalive};
pub use monitor::{HealthMonitor, MonitorSettings};
pub use probe::{PingProber, ProbeOutcome, ProbeSettings, Prober};
