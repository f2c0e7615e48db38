//! Reachability probes.
//!
//! The monitor only sees the `Prober` trait. `PingProber` sends ICMP echo
//! requests through the system `ping` binary, resolved and bounded by
//! `CommandRunner` like every other external tool.

use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use peerwatch_tunnel::{BoxFuture, CommandRunner, Tool};

static PACKETS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) packets transmitted, (\d+) (?:packets )?received").expect("packets pattern")
});

static RTT_AVG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"min/avg/max\S* = [\d.]+/([\d.]+)/").expect("rtt pattern")
});

/// Result of one probe. Failures are values, never errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub success: bool,
    /// Average round-trip time, 0 unless `success`.
    pub rtt_ms: f64,
    pub packets_sent: u32,
    pub packets_received: u32,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn failed(packets_sent: u32, error: impl Into<String>) -> Self {
        Self {
            success: false,
            rtt_ms: 0.0,
            packets_sent,
            packets_received: 0,
            error: Some(error.into()),
        }
    }
}

/// Sends a reachability probe to a VPN address.
pub trait Prober: Send + Sync {
    fn probe(&self, address: IpAddr) -> BoxFuture<'_, ProbeOutcome>;
}

/// Probe parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeSettings {
    /// Echo requests per probe.
    pub count: u32,
    /// Per-reply wait.
    pub timeout: Duration,
    /// Run `ping` through sudo.
    pub privileged: bool,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            count: 1,
            timeout: Duration::from_secs(2),
            privileged: false,
        }
    }
}

/// `Prober` backed by the system `ping`.
#[derive(Debug, Clone)]
pub struct PingProber {
    runner: CommandRunner,
    settings: ProbeSettings,
}

impl PingProber {
    pub fn new(runner: CommandRunner, settings: ProbeSettings) -> Self {
        let settings = ProbeSettings {
            count: settings.count.max(1),
            timeout: settings.timeout.max(Duration::from_secs(1)),
            ..settings
        };
        Self { runner, settings }
    }

    /// Upper bound on a whole probe, including process start-up.
    pub fn deadline(&self) -> Duration {
        self.settings.timeout * self.settings.count + Duration::from_secs(1)
    }

    async fn ping(&self, address: IpAddr) -> ProbeOutcome {
        let count = self.settings.count.to_string();
        let wait = self.settings.timeout.as_secs().to_string();
        let target = address.to_string();
        let args = ["-n", "-c", count.as_str(), "-W", wait.as_str(), target.as_str()];

        let output = match self
            .runner
            .execute(Tool::Ping, &args, self.settings.privileged, self.deadline())
            .await
        {
            Ok(output) => output,
            Err(e) => {
                debug!(%address, error = %e, "ping could not run");
                return ProbeOutcome::failed(self.settings.count, e.to_string());
            }
        };

        let summary = parse_ping_output(&output.stdout);
        let packets_sent = summary.sent.unwrap_or(self.settings.count);
        let packets_received = summary.received.unwrap_or(0);
        let success = output.status == 0 && packets_received > 0;

        let outcome = ProbeOutcome {
            success,
            rtt_ms: if success { summary.avg_rtt_ms.unwrap_or(0.0) } else { 0.0 },
            packets_sent,
            packets_received,
            error: if success {
                None
            } else if output.stderr.is_empty() {
                Some("no reply".to_string())
            } else {
                Some(output.stderr)
            },
        };
        debug!(%address, success, rtt_ms = outcome.rtt_ms, "ping finished");
        outcome
    }
}

impl Prober for PingProber {
    fn probe(&self, address: IpAddr) -> BoxFuture<'_, ProbeOutcome> {
        Box::pin(self.ping(address))
    }
}

/// Figures extracted from `ping` output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PingSummary {
    pub sent: Option<u32>,
    pub received: Option<u32>,
    pub avg_rtt_ms: Option<f64>,
}

/// Parse the statistics block printed by iputils and busybox `ping`.
pub fn parse_ping_output(stdout: &str) -> PingSummary {
    let mut summary = PingSummary::default();
    if let Some(caps) = PACKETS.captures(stdout) {
        summary.sent = caps[1].parse().ok();
        summary.received = caps[2].parse().ok();
    }
    if let Some(caps) = RTT_AVG.captures(stdout) {
        summary.avg_rtt_ms = caps[1].parse().ok();
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPUTILS_OK: &str = "\
PING 10.0.0.2 (10.0.0.2) 56(84) bytes of data.
64 bytes from 10.0.0.2: icmp_seq=1 ttl=64 time=12.4 ms

--- 10.0.0.2 ping statistics ---
1 packets transmitted, 1 received, 0% packet loss, time 0ms
rtt min/avg/max/mdev = 12.413/12.413/12.413/0.000 ms
";

    const IPUTILS_LOST: &str = "\
PING 10.0.0.3 (10.0.0.3) 56(84) bytes of data.

--- 10.0.0.3 ping statistics ---
1 packets transmitted, 0 received, 100% packet loss, time 0ms
";

    const BUSYBOX_OK: &str = "\
PING 10.0.0.4 (10.0.0.4): 56 data bytes
64 bytes from 10.0.0.4: seq=0 ttl=64 time=0.081 ms

--- 10.0.0.4 ping statistics ---
2 packets transmitted, 2 packets received, 0% packet loss
round-trip min/avg/max = 0.071/0.076/0.081 ms
";

    #[test]
    fn parses_iputils_success() {
        let s = parse_ping_output(IPUTILS_OK);
        assert_eq!(s.sent, Some(1));
        assert_eq!(s.received, Some(1));
        assert_eq!(s.avg_rtt_ms, Some(12.413));
    }

    #[test]
    fn parses_iputils_loss() {
        let s = parse_ping_output(IPUTILS_LOST);
        assert_eq!(s.sent, Some(1));
        assert_eq!(s.received, Some(0));
        assert_eq!(s.avg_rtt_ms, None);
    }

    #[test]
    fn parses_busybox_success() {
        let s = parse_ping_output(BUSYBOX_OK);
        assert_eq!(s.sent, Some(2));
        assert_eq!(s.received, Some(2));
        assert_eq!(s.avg_rtt_ms, Some(0.076));
    }

    #[test]
    fn empty_output_has_no_figures() {
        assert_eq!(parse_ping_output(""), PingSummary::default());
    }

    #[test]
    fn deadline_covers_every_packet() {
        let prober = PingProber::new(
            CommandRunner::new(Duration::from_secs(5)),
            ProbeSettings {
                count: 3,
                timeout: Duration::from_secs(2),
                privileged: false,
            },
        );
        assert_eq!(prober.deadline(), Duration::from_secs(7));
    }

    #[test]
    fn zero_settings_are_raised() {
        let prober = PingProber::new(
            CommandRunner::new(Duration::from_secs(5)),
            ProbeSettings {
                count: 0,
                timeout: Duration::ZERO,
                privileged: false,
            },
        );
        assert_eq!(prober.deadline(), Duration::from_secs(2));
    }
}
