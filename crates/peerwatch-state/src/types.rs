//! Domain types for peer health monitoring.
//!
//! `PeerHealthRecord` is the mutable per-peer entity owned by the monitor;
//! `PeerHealthSnapshot` and `HealthOverview` are the serialisable views
//! handed to the request layer.

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remote endpoint string reported for peers that have never connected.
pub const NO_ENDPOINT: &str = "(none)";

/// Allowed probe interval range in seconds.
pub const PING_INTERVAL_MIN: u32 = 10;
pub const PING_INTERVAL_MAX: u32 = 300;

/// Allowed persistent-keepalive range in seconds.
pub const KEEPALIVE_MIN: u16 = 10;
pub const KEEPALIVE_MAX: u16 = 120;

// ── Peer status ───────────────────────────────────────────────────

/// Classified reachability of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerStatus {
    /// Handshake under 3 minutes old and the probe answered.
    Online,
    /// Handshake under 3 minutes old but the probe went unanswered
    /// (typically ICMP filtered on the peer).
    Unpingable,
    /// Handshake between 3 and 15 minutes old.
    Recent,
    /// Handshake older than 15 minutes; not probed.
    Offline,
    /// No handshake ever observed; not probed.
    Unknown,
}

impl PeerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerStatus::Online => "online",
            PeerStatus::Unpingable => "unpingable",
            PeerStatus::Recent => "recent",
            PeerStatus::Offline => "offline",
            PeerStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Peer health record ────────────────────────────────────────────

/// Health information tracked for one peer, keyed by its public key.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerHealthRecord {
    pub public_key: String,
    pub interface: String,
    pub name: String,
    /// VPN-internal address the probes are sent to.
    pub vpn_ip: IpAddr,

    pub is_pingable: bool,
    pub last_ping_time: Option<DateTime<Utc>>,
    pub last_ping_success: bool,
    pub ping_rtt_ms: f64,
    pub ping_success_count: u64,
    pub ping_fail_count: u64,

    pub last_handshake: Option<DateTime<Utc>>,
    pub status: PeerStatus,

    pub last_endpoint: String,
    pub endpoint_changed: bool,
}

impl PeerHealthRecord {
    pub fn new(public_key: &str, interface: &str, name: &str, vpn_ip: IpAddr) -> Self {
        Self {
            public_key: public_key.to_string(),
            interface: interface.to_string(),
            name: name.to_string(),
            vpn_ip,
            is_pingable: false,
            last_ping_time: None,
            last_ping_success: false,
            ping_rtt_ms: 0.0,
            ping_success_count: 0,
            ping_fail_count: 0,
            last_handshake: None,
            status: PeerStatus::Unknown,
            last_endpoint: String::new(),
            endpoint_changed: false,
        }
    }

    /// Compare the reported endpoint with the one seen last cycle.
    ///
    /// Sets `endpoint_changed` only when both the previous and the current
    /// endpoint are real addresses and differ; clears it otherwise. The
    /// current endpoint is always remembered. Returns the new flag.
    pub fn observe_endpoint(&mut self, current: &str) -> bool {
        let previous = self.last_endpoint.as_str();
        self.endpoint_changed = is_real_endpoint(previous)
            && is_real_endpoint(current)
            && previous != current;
        self.last_endpoint = current.to_string();
        self.endpoint_changed
    }

    /// Record the result of a probe.
    pub fn record_probe(&mut self, success: bool, rtt_ms: f64, at: DateTime<Utc>) {
        self.last_ping_time = Some(at);
        self.last_ping_success = success;
        self.ping_rtt_ms = if success { rtt_ms } else { 0.0 };
        if success {
            self.ping_success_count += 1;
        } else {
            self.ping_fail_count += 1;
        }
    }

    /// Probe success rate as a percentage rounded to one decimal.
    pub fn success_rate(&self) -> f64 {
        let total = self.ping_success_count + self.ping_fail_count;
        if total == 0 {
            return 0.0;
        }
        round_to(self.ping_success_count as f64 / total as f64 * 100.0, 1)
    }

    pub fn snapshot(&self) -> PeerHealthSnapshot {
        PeerHealthSnapshot {
            public_key: self.public_key.clone(),
            vpn_ip: self.vpn_ip,
            interface: self.interface.clone(),
            name: self.name.clone(),
            is_pingable: self.is_pingable,
            last_ping_time: self.last_ping_time,
            last_ping_success: self.last_ping_success,
            ping_rtt_ms: round_to(self.ping_rtt_ms, 2),
            ping_success_rate: self.success_rate(),
            status: self.status,
            last_handshake: self.last_handshake,
            last_endpoint: self.last_endpoint.clone(),
            endpoint_changed: self.endpoint_changed,
        }
    }
}

fn is_real_endpoint(endpoint: &str) -> bool {
    !endpoint.is_empty() && endpoint != NO_ENDPOINT
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Serialisable view of a `PeerHealthRecord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerHealthSnapshot {
    pub public_key: String,
    pub vpn_ip: IpAddr,
    pub interface: String,
    pub name: String,
    pub is_pingable: bool,
    pub last_ping_time: Option<DateTime<Utc>>,
    pub last_ping_success: bool,
    pub ping_rtt_ms: f64,
    /// Percentage of successful probes (0.0–100.0).
    pub ping_success_rate: f64,
    pub status: PeerStatus,
    pub last_handshake: Option<DateTime<Utc>>,
    pub last_endpoint: String,
    pub endpoint_changed: bool,
}

// ── Interface configuration ───────────────────────────────────────

/// Monitoring settings for one tunnel interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceHealthConfig {
    pub enabled: bool,
    /// Seconds between cycles, within `PING_INTERVAL_MIN..=PING_INTERVAL_MAX`.
    pub ping_interval: u32,
    /// Keep every peer's persistent-keepalive at `keepalive_value`.
    pub set_keepalive: bool,
    /// Seconds, within `KEEPALIVE_MIN..=KEEPALIVE_MAX`.
    pub keepalive_value: u16,
}

impl Default for InterfaceHealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ping_interval: 30,
            set_keepalive: true,
            keepalive_value: 25,
        }
    }
}

/// Clamp a requested probe interval into the allowed range.
pub fn clamp_ping_interval(secs: i64) -> u32 {
    secs.clamp(PING_INTERVAL_MIN as i64, PING_INTERVAL_MAX as i64) as u32
}

/// Clamp a requested keepalive into the allowed range.
pub fn clamp_keepalive(secs: i64) -> u16 {
    secs.clamp(KEEPALIVE_MIN as i64, KEEPALIVE_MAX as i64) as u16
}

/// Partial update of an `InterfaceHealthConfig`. Absent fields are left as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub enabled: Option<bool>,
    pub ping_interval: Option<i64>,
    pub set_keepalive: Option<bool>,
    pub keepalive_value: Option<i64>,
}

impl ConfigUpdate {
    /// Apply the update, clamping numeric fields.
    pub fn apply(&self, config: &mut InterfaceHealthConfig) {
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(interval) = self.ping_interval {
            config.ping_interval = clamp_ping_interval(interval);
        }
        if let Some(set) = self.set_keepalive {
            config.set_keepalive = set;
        }
        if let Some(keepalive) = self.keepalive_value {
            config.keepalive_value = clamp_keepalive(keepalive);
        }
    }
}

/// Interface entry in the full health overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceHealthView {
    #[serde(flatten)]
    pub config: InterfaceHealthConfig,
    pub interface_active: bool,
}

// ── Statistics ────────────────────────────────────────────────────

/// Process-lifetime counters, reset only on restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub total_pings: u64,
    pub successful_pings: u64,
    pub failed_pings: u64,
    pub skipped_offline: u64,
    pub endpoint_updates: u64,
    pub last_cycle_time: Option<DateTime<Utc>>,
    pub last_cycle_duration_ms: f64,
}

impl MonitorStats {
    /// Count one issued probe.
    pub fn record_probe(&mut self, success: bool) {
        self.total_pings += 1;
        if success {
            self.successful_pings += 1;
        } else {
            self.failed_pings += 1;
        }
    }

    pub fn record_cycle(&mut self, finished_at: DateTime<Utc>, duration_ms: f64) {
        self.last_cycle_time = Some(finished_at);
        self.last_cycle_duration_ms = round_to(duration_ms, 2);
    }
}

/// Counters for a single monitoring cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub checked: u32,
    pub online: u32,
    pub unpingable: u32,
    pub recent: u32,
    pub offline: u32,
    pub skipped: u32,
    pub pingable: u32,
    pub endpoint_changes: u32,
    pub keepalive_corrections: u32,
    pub evicted: u32,
    pub duration_ms: f64,
}

impl CycleReport {
    /// Fold the per-peer outcome into the cycle counters.
    pub fn count(&mut self, status: PeerStatus, pingable: bool) {
        match status {
            PeerStatus::Online => self.online += 1,
            PeerStatus::Unpingable => self.unpingable += 1,
            PeerStatus::Recent => self.recent += 1,
            PeerStatus::Offline => {
                self.offline += 1;
                self.skipped += 1;
            }
            PeerStatus::Unknown => self.skipped += 1,
        }
        if pingable {
            self.pingable += 1;
        }
    }
}

/// Everything the request layer shows on the health page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthOverview {
    pub peers: BTreeMap<String, PeerHealthSnapshot>,
    pub interfaces: BTreeMap<String, InterfaceHealthView>,
    pub stats: MonitorStats,
    pub running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PeerHealthRecord {
        PeerHealthRecord::new("key", "wg0", "laptop", "10.0.0.2".parse().unwrap())
    }

    #[test]
    fn first_endpoint_is_not_a_change() {
        let mut rec = record();
        assert!(!rec.observe_endpoint("203.0.113.5:51820"));
        assert_eq!(rec.last_endpoint, "203.0.113.5:51820");
    }

    #[test]
    fn roaming_sets_flag_then_clears() {
        let mut rec = record();
        rec.observe_endpoint("203.0.113.5:51820");
        assert!(rec.observe_endpoint("198.51.100.7:40000"));
        assert!(rec.endpoint_changed);

        assert!(!rec.observe_endpoint("198.51.100.7:40000"));
        assert!(!rec.endpoint_changed);
    }

    #[test]
    fn none_sentinel_never_counts_as_change() {
        let mut rec = record();
        rec.observe_endpoint("203.0.113.5:51820");
        assert!(!rec.observe_endpoint(NO_ENDPOINT));
        assert!(!rec.observe_endpoint("198.51.100.7:40000"));
    }

    #[test]
    fn success_rate_rounds_to_one_decimal() {
        let mut rec = record();
        assert_eq!(rec.success_rate(), 0.0);

        let now = Utc::now();
        rec.record_probe(true, 12.3456, now);
        rec.record_probe(true, 10.0, now);
        rec.record_probe(false, 99.0, now);
        assert_eq!(rec.success_rate(), 66.7);
        assert_eq!(rec.ping_rtt_ms, 0.0);
        assert_eq!(rec.ping_success_count, 2);
        assert_eq!(rec.ping_fail_count, 1);
    }

    #[test]
    fn snapshot_rounds_rtt() {
        let mut rec = record();
        rec.record_probe(true, 12.3456, Utc::now());
        let snap = rec.snapshot();
        assert_eq!(snap.ping_rtt_ms, 12.35);
        assert_eq!(snap.ping_success_rate, 100.0);
    }

    #[test]
    fn clamps_config_values() {
        assert_eq!(clamp_ping_interval(1), 10);
        assert_eq!(clamp_ping_interval(1_000), 300);
        assert_eq!(clamp_ping_interval(45), 45);
        assert_eq!(clamp_keepalive(999), 120);
        assert_eq!(clamp_keepalive(-5), 10);
    }

    #[test]
    fn update_applies_only_present_fields() {
        let mut cfg = InterfaceHealthConfig::default();
        let update = ConfigUpdate {
            ping_interval: Some(1),
            keepalive_value: Some(999),
            ..Default::default()
        };
        update.apply(&mut cfg);
        assert!(cfg.enabled);
        assert!(cfg.set_keepalive);
        assert_eq!(cfg.ping_interval, 10);
        assert_eq!(cfg.keepalive_value, 120);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&PeerStatus::Unpingable).unwrap();
        assert_eq!(json, "\"unpingable\"");
    }

    #[test]
    fn interface_view_flattens_config() {
        let view = InterfaceHealthView {
            config: InterfaceHealthConfig::default(),
            interface_active: true,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["ping_interval"], 30);
        assert_eq!(json["interface_active"], true);
    }

    #[test]
    fn cycle_report_counts_skips() {
        let mut report = CycleReport::default();
        report.count(PeerStatus::Offline, false);
        report.count(PeerStatus::Unknown, false);
        report.count(PeerStatus::Online, true);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.offline, 1);
        assert_eq!(report.online, 1);
        assert_eq!(report.pingable, 1);
    }
}
