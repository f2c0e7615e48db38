//! Input structs describing what the tunnel layer reports.

use chrono::{DateTime, Utc};

/// Which userspace tool controls an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    #[default]
    Wg,
    /// AmneziaWG, driven by the `awg` tool.
    Awg,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Wg => "wg",
            Protocol::Awg => "awg",
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wg" => Ok(Protocol::Wg),
            "awg" => Ok(Protocol::Awg),
            other => Err(format!("unsupported protocol: {other}")),
        }
    }
}

/// Administrative state of one tunnel interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceState {
    pub name: String,
    pub protocol: Protocol,
    pub is_up: bool,
}

/// Last-handshake value as reported by the tunnel layer.
///
/// Different reporters hand this over in different shapes; the health
/// monitor normalises them into an age.
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeValue {
    /// Free-form text: `H:MM:SS`, `N day(s), H:MM:SS`, an ISO-8601
    /// timestamp, a numeric Unix timestamp, or a "never" sentinel.
    Text(String),
    /// Unix timestamp in seconds.
    Unix(f64),
    /// Absolute point in time.
    At(DateTime<Utc>),
    /// Nothing reported.
    Absent,
}

/// One peer as reported by the tunnel layer.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerReport {
    pub public_key: String,
    /// Display name; empty when unknown.
    pub name: String,
    /// Comma-separated CIDR list.
    pub allowed_ips: String,
    /// Remote endpoint, or `(none)`.
    pub endpoint: String,
    pub latest_handshake: HandshakeValue,
    /// Current persistent-keepalive in seconds, `None` when off.
    pub persistent_keepalive: Option<u16>,
}
