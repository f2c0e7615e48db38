//! `TunnelSource` backed by the `wg` / `awg` command-line tools.

use std::collections::{BTreeMap, HashMap, HashSet};

use peerwatch_state::names::{validate_interface, validate_peer_id};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::command::{CommandRunner, Tool};
use crate::error::{TunnelError, TunnelResult};
use crate::source::{BoxFuture, TunnelSource};
use crate::types::{HandshakeValue, InterfaceState, PeerReport, Protocol};

/// `wg show` sub-fields Peerwatch may request.
const SHOW_FIELDS: &[&str] = &["dump", "endpoints", "latest-handshakes", "transfer"];

/// Number of tab-separated columns in a `wg show <iface> dump` peer line.
const DUMP_PEER_COLUMNS: usize = 8;

/// An interface Peerwatch should watch.
#[derive(Debug, Clone, Default)]
pub struct WgInterface {
    pub name: String,
    pub protocol: Protocol,
    /// Display names keyed by peer public key.
    pub peer_names: HashMap<String, String>,
}

/// Production `TunnelSource`.
///
/// With an explicit interface list, interfaces missing from
/// `wg show interfaces` are reported as down. Without one, running `wg` and
/// `awg` interfaces are discovered; once seen, an interface stays listed
/// and is reported as down while it is not running.
pub struct WgCli {
    runner: CommandRunner,
    interfaces: Vec<WgInterface>,
    discovered: Mutex<BTreeMap<String, Protocol>>,
}

impl WgCli {
    pub fn new(runner: CommandRunner, interfaces: Vec<WgInterface>) -> Self {
        Self {
            runner,
            interfaces,
            discovered: Mutex::new(BTreeMap::new()),
        }
    }

    /// `wg show <interface> <field>`.
    pub async fn show(&self, protocol: Protocol, interface: &str, field: &str) -> TunnelResult<String> {
        if !SHOW_FIELDS.contains(&field) {
            return Err(TunnelError::UnsupportedField(field.to_string()));
        }
        let iface = validate_interface(interface)?;
        self.runner
            .run(Tool::for_protocol(protocol), &["show", iface, field], true)
            .await
    }

    /// Names printed by `wg show interfaces`.
    pub async fn running_interfaces(&self, protocol: Protocol) -> TunnelResult<Vec<String>> {
        let out = self
            .runner
            .run(Tool::for_protocol(protocol), &["show", "interfaces"], true)
            .await?;
        Ok(out.split_whitespace().map(str::to_string).collect())
    }

    fn peer_names(&self, interface: &str) -> Option<&HashMap<String, String>> {
        self.interfaces
            .iter()
            .find(|i| i.name == interface)
            .map(|i| &i.peer_names)
    }

    async fn interfaces_impl(&self) -> TunnelResult<Vec<InterfaceState>> {
        if self.interfaces.is_empty() {
            return self.discover().await;
        }

        let protocols: HashSet<Protocol> = self.interfaces.iter().map(|i| i.protocol).collect();
        let mut running: HashMap<Protocol, HashSet<String>> = HashMap::new();
        for protocol in protocols {
            let names = match self.running_interfaces(protocol).await {
                Ok(names) => names.into_iter().collect(),
                Err(e) => {
                    warn!(protocol = protocol.as_str(), error = %e, "could not list running interfaces");
                    HashSet::new()
                }
            };
            running.insert(protocol, names);
        }

        Ok(self
            .interfaces
            .iter()
            .map(|i| InterfaceState {
                name: i.name.clone(),
                protocol: i.protocol,
                is_up: running
                    .get(&i.protocol)
                    .is_some_and(|names| names.contains(&i.name)),
            })
            .collect())
    }

    async fn discover(&self) -> TunnelResult<Vec<InterfaceState>> {
        let mut running = Vec::new();
        let mut last_error = None;
        for protocol in [Protocol::Wg, Protocol::Awg] {
            match self.running_interfaces(protocol).await {
                Ok(names) => running.push((protocol, names)),
                Err(e) => {
                    debug!(protocol = protocol.as_str(), error = %e, "interface discovery skipped");
                    last_error = Some(e);
                }
            }
        }
        if let (true, Some(e)) = (running.is_empty(), last_error) {
            return Err(e);
        }
        let mut seen = self.discovered.lock().await;
        Ok(merge_discovered(&mut seen, &running))
    }

    async fn peers_impl(&self, interface: &InterfaceState) -> TunnelResult<Vec<PeerReport>> {
        let dump = self.show(interface.protocol, &interface.name, "dump").await?;
        if dump.trim().is_empty() {
            return Err(TunnelError::Malformed {
                program: Tool::for_protocol(interface.protocol).name().to_string(),
                reason: format!("empty dump for {}", interface.name),
            });
        }
        let empty = HashMap::new();
        let names = self.peer_names(&interface.name).unwrap_or(&empty);
        let peers = parse_dump(&dump, names);
        debug!(interface = %interface.name, peers = peers.len(), "peers listed");
        Ok(peers)
    }

    async fn set_keepalive_impl(
        &self,
        interface: &str,
        protocol: Protocol,
        peer: &str,
        seconds: u16,
    ) -> TunnelResult<()> {
        let iface = validate_interface(interface)?;
        let peer = validate_peer_id(peer)?;
        let seconds = seconds.to_string();
        self.runner
            .run(
                Tool::for_protocol(protocol),
                &["set", iface, "peer", peer, "persistent-keepalive", &seconds],
                true,
            )
            .await?;
        Ok(())
    }
}

impl TunnelSource for WgCli {
    fn list_interfaces(&self) -> BoxFuture<'_, TunnelResult<Vec<InterfaceState>>> {
        Box::pin(self.interfaces_impl())
    }

    fn list_peers<'a>(
        &'a self,
        interface: &'a InterfaceState,
    ) -> BoxFuture<'a, TunnelResult<Vec<PeerReport>>> {
        Box::pin(self.peers_impl(interface))
    }

    fn set_keepalive<'a>(
        &'a self,
        interface: &'a str,
        protocol: Protocol,
        peer: &'a str,
        seconds: u16,
    ) -> BoxFuture<'a, TunnelResult<()>> {
        Box::pin(self.set_keepalive_impl(interface, protocol, peer, seconds))
    }
}

/// Fold running interface names into the discovered set and report every
/// known interface, marking the ones not running as down.
fn merge_discovered(
    seen: &mut BTreeMap<String, Protocol>,
    running: &[(Protocol, Vec<String>)],
) -> Vec<InterfaceState> {
    let mut up = HashSet::new();
    for (protocol, names) in running {
        for name in names.iter().filter(|name| validate_interface(name).is_ok()) {
            seen.insert(name.clone(), *protocol);
            up.insert(name.as_str());
        }
    }
    seen.iter()
        .map(|(name, protocol)| InterfaceState {
            name: name.clone(),
            protocol: *protocol,
            is_up: up.contains(name.as_str()),
        })
        .collect()
}

/// Parse `wg show <iface> dump` output.
///
/// The first line describes the interface itself; every following line is
/// a peer: public key, preshared key, endpoint, allowed ips, latest
/// handshake (Unix seconds, `0` for never), rx bytes, tx bytes,
/// persistent keepalive (`off` or seconds). Malformed lines are skipped.
pub fn parse_dump(dump: &str, names: &HashMap<String, String>) -> Vec<PeerReport> {
    dump.lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() != DUMP_PEER_COLUMNS {
                warn!(columns = cols.len(), "skipping malformed dump line");
                return None;
            }
            let public_key = cols[0].to_string();
            let latest_handshake = match cols[4].parse::<f64>() {
                Ok(ts) => HandshakeValue::Unix(ts),
                Err(_) => HandshakeValue::Text(cols[4].to_string()),
            };
            Some(PeerReport {
                name: names.get(&public_key).cloned().unwrap_or_default(),
                public_key,
                allowed_ips: cols[3].to_string(),
                endpoint: cols[2].to_string(),
                latest_handshake,
                persistent_keepalive: cols[7].parse::<u16>().ok(),
            })
        })
        .collect()
}
