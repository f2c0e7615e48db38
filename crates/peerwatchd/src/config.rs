//! peerwatch.toml configuration.
//!
//! Every section is optional. A missing file at the default location means
//! "run with defaults"; a file named explicitly must exist.

use std::collections::HashMap;
use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

use peerwatch_health::{MonitorSettings, ProbeSettings};
use peerwatch_state::PING_INTERVAL_MIN;
use peerwatch_state::names::validate_interface;
use peerwatch_tunnel::{Protocol, WgInterface};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/peerwatch/peerwatch.toml";
pub const CONFIG_ENV: &str = "PEERWATCH_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub monitor: MonitorSection,
    pub probe: ProbeSection,
    pub settings: SettingsSection,
    pub api: ApiSection,
    pub interfaces: Vec<InterfaceEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub warmup_secs: u64,
    pub default_interval_secs: u64,
    pub max_concurrent_probes: usize,
    pub stop_timeout_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            warmup_secs: 15,
            default_interval_secs: 30,
            max_concurrent_probes: 16,
            stop_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSection {
    pub count: u32,
    pub timeout_secs: u64,
    pub privileged: bool,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            count: 1,
            timeout_secs: 2,
            privileged: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsSection {
    /// INI file holding the `Health:<interface>` sections.
    pub path: PathBuf,
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/etc/peerwatch/settings.ini"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub listen: SocketAddr,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 10087)),
        }
    }
}

/// One `[[interfaces]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceEntry {
    pub name: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Display names keyed by peer public key.
    #[serde(default)]
    pub peer_names: HashMap<String, String>,
}

fn default_protocol() -> String {
    "wg".to_string()
}

impl DaemonConfig {
    /// Load from the resolved path. See [`resolve_path`].
    pub fn load(cli_path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = resolve_path(cli_path, std::env::var_os(CONFIG_ENV));
        if !required && !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))?;
        info!(path = %path.display(), interfaces = config.interfaces.len(), "config loaded");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        config.wg_interfaces()?;
        Ok(config)
    }

    /// Scheduler settings. The fallback interval is raised to
    /// `PING_INTERVAL_MIN` like the per-interface ones.
    pub fn monitor_settings(&self) -> MonitorSettings {
        let default_interval = self.monitor.default_interval_secs.max(PING_INTERVAL_MIN as u64);
        MonitorSettings {
            warmup: Duration::from_secs(self.monitor.warmup_secs),
            default_interval: Duration::from_secs(default_interval),
            max_concurrent_probes: self.monitor.max_concurrent_probes,
            stop_timeout: Duration::from_secs(self.monitor.stop_timeout_secs),
        }
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            count: self.probe.count,
            timeout: Duration::from_secs(self.probe.timeout_secs),
            privileged: self.probe.privileged,
        }
    }

    /// Validated interface list for `WgCli`.
    pub fn wg_interfaces(&self) -> anyhow::Result<Vec<WgInterface>> {
        let mut seen = std::collections::HashSet::new();
        self.interfaces
            .iter()
            .map(|entry| {
                validate_interface(&entry.name)?;
                if !seen.insert(entry.name.as_str()) {
                    bail!("interface {} listed twice", entry.name);
                }
                let protocol: Protocol = entry
                    .protocol
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!("interface {}: {e}", entry.name))?;
                Ok(WgInterface {
                    name: entry.name.clone(),
                    protocol,
                    peer_names: entry.peer_names.clone(),
                })
            })
            .collect()
    }
}

/// Pick the config path: `--config`, then `$PEERWATCH_CONFIG`, then the
/// default. Returns whether the file must exist.
pub fn resolve_path(cli_path: Option<&Path>, env: Option<OsString>) -> (PathBuf, bool) {
    if let Some(path) = cli_path {
        return (path.to_path_buf(), true);
    }
    match env {
        Some(value) if !value.is_empty() => (PathBuf::from(value), true),
        _ => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = DaemonConfig::from_toml("").unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.monitor_settings(), MonitorSettings::default());
        assert_eq!(config.probe_settings(), ProbeSettings::default());
        assert_eq!(config.api.listen.to_string(), "127.0.0.1:10087");
    }

    #[test]
    fn full_file() {
        let config = DaemonConfig::from_toml(
            r#"
[monitor]
warmup_secs = 0
max_concurrent_probes = 4

[probe]
timeout_secs = 3
privileged = true

[settings]
path = "/var/lib/peerwatch/settings.ini"

[api]
listen = "0.0.0.0:9000"

[[interfaces]]
name = "wg0"
peer_names = { "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=" = "laptop" }

[[interfaces]]
name = "awg1"
protocol = "awg"
"#,
        )
        .unwrap();

        let monitor = config.monitor_settings();
        assert_eq!(monitor.warmup, Duration::ZERO);
        assert_eq!(monitor.default_interval, Duration::from_secs(30));
        assert_eq!(monitor.max_concurrent_probes, 4);

        let probe = config.probe_settings();
        assert_eq!(probe.count, 1);
        assert_eq!(probe.timeout, Duration::from_secs(3));
        assert!(probe.privileged);

        assert_eq!(config.settings.path, PathBuf::from("/var/lib/peerwatch/settings.ini"));
        assert_eq!(config.api.listen.port(), 9000);

        let interfaces = config.wg_interfaces().unwrap();
        assert_eq!(interfaces.len(), 2);
        assert_eq!(interfaces[0].protocol, Protocol::Wg);
        assert_eq!(
            interfaces[0].peer_names["xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg="],
            "laptop"
        );
        assert_eq!(interfaces[1].protocol, Protocol::Awg);
    }

    #[test]
    fn zero_default_interval_is_raised() {
        let config = DaemonConfig::from_toml("[monitor]\ndefault_interval_secs = 0\n").unwrap();
        assert_eq!(
            config.monitor_settings().default_interval,
            Duration::from_secs(PING_INTERVAL_MIN as u64)
        );
    }

    #[test]
    fn rejects_bad_interfaces() {
        assert!(DaemonConfig::from_toml("[[interfaces]]\nname = \"wg0; reboot\"\n").is_err());
        assert!(DaemonConfig::from_toml("[[interfaces]]\nname = \"wg0\"\nprotocol = \"ipsec\"\n").is_err());
        assert!(
            DaemonConfig::from_toml("[[interfaces]]\nname = \"wg0\"\n[[interfaces]]\nname = \"wg0\"\n")
                .is_err()
        );
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(DaemonConfig::from_toml("[monitor]\nwarmup_secs = \"soon\"\n").is_err());
    }

    #[test]
    fn path_resolution_order() {
        let cli = PathBuf::from("/tmp/cli.toml");
        assert_eq!(
            resolve_path(Some(&cli), Some("/tmp/env.toml".into())),
            (cli.clone(), true)
        );
        assert_eq!(
            resolve_path(None, Some("/tmp/env.toml".into())),
            (PathBuf::from("/tmp/env.toml"), true)
        );
        assert_eq!(
            resolve_path(None, Some("".into())),
            (PathBuf::from(DEFAULT_CONFIG_PATH), false)
        );
        assert_eq!(resolve_path(None, None), (PathBuf::from(DEFAULT_CONFIG_PATH), false));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(DaemonConfig::load(Some(&missing)).is_err());

        let present = dir.path().join("peerwatch.toml");
        std::fs::write(&present, "[probe]\ncount = 3\n").unwrap();
        assert_eq!(DaemonConfig::load(Some(&present)).unwrap().probe.count, 3);
    }
}
