//! Health monitor: background scheduler and query facade.
//!
//! `HealthMonitor` owns the peer health records and aggregate statistics
//! behind a single mutex. The background worker is the only writer apart
//! from forced single-peer probes. Probes never run while that mutex is
//! held: each peer is registered and gated under the lock, probed with the
//! lock released, then settled under the lock again.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use peerwatch_state::{
    ConfigUpdate, CycleReport, HealthOverview, InterfaceConfigStore, InterfaceHealthConfig,
    InterfaceHealthView, MonitorStats, PeerHealthRecord, PeerHealthSnapshot, PeerStatus,
};
use peerwatch_tunnel::{HandshakeValue, TunnelSource};

use crate::address::vpn_address;
use crate::classifier::{Gate, apply, classify, gate};
use crate::error::{MonitorError, MonitorResult};
use crate::handshake::parse_handshake;
use crate::keepalive::reconcile_keepalive;
use crate::probe::Prober;

/// Scheduler tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorSettings {
    /// Delay between `start()` and the first cycle.
    pub warmup: Duration,
    /// Sleep between cycles when no interface is enabled.
    pub default_interval: Duration,
    /// Upper bound on probes in flight during one cycle.
    pub max_concurrent_probes: usize,
    /// How long `stop()` waits for the worker.
    pub stop_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(15),
            default_interval: Duration::from_secs(30),
            max_concurrent_probes: 16,
            stop_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Default)]
struct HealthBook {
    records: HashMap<String, PeerHealthRecord>,
    stats: MonitorStats,
}

/// Handle to the running background worker.
struct WorkerSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

struct Shared {
    tunnels: Arc<dyn TunnelSource>,
    prober: Arc<dyn Prober>,
    configs: InterfaceConfigStore,
    settings: MonitorSettings,
    book: Mutex<HealthBook>,
    cycle_lock: Mutex<()>,
    worker: Mutex<Option<WorkerSlot>>,
    running: AtomicBool,
}

/// A reported peer queued for this cycle.
#[derive(Debug, Clone)]
struct PeerTarget {
    interface: String,
    public_key: String,
    name: String,
    vpn_ip: IpAddr,
    endpoint: String,
    latest_handshake: HandshakeValue,
}

/// Per-peer result folded into the `CycleReport`.
#[derive(Debug, Clone, Copy)]
struct PeerVerdict {
    status: PeerStatus,
    pingable: bool,
    endpoint_changed: bool,
}

/// What the tunnel layer reported this cycle, for stale-record eviction.
#[derive(Debug, Default)]
struct Sighting {
    /// Every interface reported, up or down.
    interfaces: HashSet<String>,
    /// Peer keys of interfaces whose peer list was read successfully.
    listed: HashMap<String, HashSet<String>>,
}

/// Periodic peer health monitor. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct HealthMonitor {
    shared: Arc<Shared>,
}

impl HealthMonitor {
    pub fn new(
        tunnels: Arc<dyn TunnelSource>,
        prober: Arc<dyn Prober>,
        configs: InterfaceConfigStore,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                tunnels,
                prober,
                configs,
                settings,
                book: Mutex::new(HealthBook::default()),
                cycle_lock: Mutex::new(()),
                worker: Mutex::new(None),
                running: AtomicBool::new(false),
            }),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────

    /// Spawn the background worker. Returns `false` if already running.
    pub async fn start(&self) -> bool {
        let mut slot = self.shared.worker.lock().await;
        if slot.is_some() {
            warn!("health monitor already running");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shared.running.store(true, Ordering::SeqCst);
        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            monitor.run_loop(shutdown_rx).await;
        });
        *slot = Some(WorkerSlot {
            handle,
            shutdown_tx,
        });

        info!(
            warmup_secs = self.shared.settings.warmup.as_secs(),
            "peer health monitor started"
        );
        true
    }

    /// Signal the worker and wait, bounded, for it to exit. Returns `false`
    /// if it was not running.
    pub async fn stop(&self) -> bool {
        let Some(mut slot) = self.shared.worker.lock().await.take() else {
            return false;
        };
        self.shared.running.store(false, Ordering::SeqCst);
        let _ = slot.shutdown_tx.send(true);

        match tokio::time::timeout(self.shared.settings.stop_timeout, &mut slot.handle).await {
            Ok(Ok(())) => info!("peer health monitor stopped"),
            Ok(Err(e)) => error!(error = %e, "health monitor worker ended abnormally"),
            Err(_) => warn!(
                timeout_secs = self.shared.settings.stop_timeout.as_secs(),
                "health monitor worker still busy, it will exit after the current cycle"
            ),
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    async fn run_loop(&self, mut shutdown: watch::Receiver<bool>) {
        debug!("health loop starting");
        if !sleep_or_shutdown(self.shared.settings.warmup, &mut shutdown).await {
            debug!("health loop stopped during warm-up");
            return;
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.run_cycle().await;

            let interval = self
                .shared
                .configs
                .next_interval(self.shared.settings.default_interval)
                .await;
            debug!(interval_secs = interval.as_secs(), "next health cycle scheduled");
            if !sleep_or_shutdown(interval, &mut shutdown).await {
                break;
            }
        }
        debug!("health loop shutting down");
    }

    // ── Cycle ─────────────────────────────────────────────────────

    /// Run one full cycle now and return its counters.
    pub async fn force_cycle(&self) -> CycleReport {
        self.run_cycle().await
    }

    async fn run_cycle(&self) -> CycleReport {
        let _cycle = self.shared.cycle_lock.lock().await;
        let started = Instant::now();
        let mut report = CycleReport::default();

        let (targets, sighting) = self.collect_targets(&mut report).await;

        let permits = Arc::new(Semaphore::new(self.shared.settings.max_concurrent_probes.max(1)));
        let mut tasks = JoinSet::new();
        for target in targets {
            let monitor = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let key = target.public_key.clone();
                (key, monitor.check_peer(target).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(verdict))) => {
                    report.checked += 1;
                    report.count(verdict.status, verdict.pingable);
                    if verdict.endpoint_changed {
                        report.endpoint_changes += 1;
                    }
                }
                Ok((key, Err(e))) => warn!(peer = %key, error = %e, "peer check failed"),
                Err(e) => error!(error = %e, "peer check task panicked"),
            }
        }

        let mut book = self.shared.book.lock().await;
        if let Some(sighting) = sighting {
            report.evicted = evict_stale(&mut book.records, &sighting);
        }
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        book.stats.record_cycle(Utc::now(), duration_ms);
        report.duration_ms = book.stats.last_cycle_duration_ms;
        drop(book);

        info!(
            checked = report.checked,
            online = report.online,
            unpingable = report.unpingable,
            recent = report.recent,
            offline = report.offline,
            skipped = report.skipped,
            endpoint_changes = report.endpoint_changes,
            keepalive_corrections = report.keepalive_corrections,
            evicted = report.evicted,
            duration_ms = report.duration_ms,
            "health cycle complete"
        );
        report
    }

    /// Walk the enabled, up interfaces: reconcile keepalives and gather the
    /// peers that have a single-host VPN address.
    async fn collect_targets(&self, report: &mut CycleReport) -> (Vec<PeerTarget>, Option<Sighting>) {
        let interfaces = match self.shared.tunnels.list_interfaces().await {
            Ok(interfaces) => interfaces,
            Err(e) => {
                error!(error = %e, "failed to list tunnel interfaces");
                return (Vec::new(), None);
            }
        };

        let mut sighting = Sighting {
            interfaces: interfaces.iter().map(|i| i.name.clone()).collect(),
            ..Default::default()
        };
        let mut targets = Vec::new();

        for interface in &interfaces {
            if !interface.is_up {
                debug!(interface = %interface.name, "interface down, skipping");
                continue;
            }
            let config = match self.shared.configs.get_or_init(&interface.name).await {
                Ok(config) => config,
                Err(e) => {
                    warn!(interface = %interface.name, error = %e, "skipping interface");
                    continue;
                }
            };
            if !config.enabled {
                debug!(interface = %interface.name, "monitoring disabled, skipping");
                continue;
            }

            let peers = match self.shared.tunnels.list_peers(interface).await {
                Ok(peers) => peers,
                Err(e) => {
                    warn!(interface = %interface.name, error = %e, "failed to list peers");
                    continue;
                }
            };
            sighting.listed.insert(
                interface.name.clone(),
                peers.iter().map(|p| p.public_key.clone()).collect(),
            );

            if config.set_keepalive {
                let keepalive = reconcile_keepalive(
                    self.shared.tunnels.as_ref(),
                    interface,
                    &peers,
                    config.keepalive_value,
                )
                .await;
                report.keepalive_corrections += keepalive.corrected;
            }

            for peer in peers {
                let Some(vpn_ip) = vpn_address(&peer.allowed_ips) else {
                    debug!(
                        interface = %interface.name,
                        peer = %peer.public_key,
                        allowed_ips = %peer.allowed_ips,
                        "no single-host address, skipping peer"
                    );
                    continue;
                };
                targets.push(PeerTarget {
                    interface: interface.name.clone(),
                    public_key: peer.public_key,
                    name: peer.name,
                    vpn_ip,
                    endpoint: peer.endpoint,
                    latest_handshake: peer.latest_handshake,
                });
            }
        }

        (targets, Some(sighting))
    }

    /// Register, gate, probe and settle one peer.
    async fn check_peer(&self, target: PeerTarget) -> MonitorResult<PeerVerdict> {
        let key = target.public_key.clone();

        let (age, endpoint_changed) = {
            let mut guard = self.shared.book.lock().await;
            let HealthBook { records, stats } = &mut *guard;
            let record = records.entry(key.clone()).or_insert_with(|| {
                PeerHealthRecord::new(&target.public_key, &target.interface, &target.name, target.vpn_ip)
            });
            record.interface = target.interface.clone();
            record.name = target.name.clone();
            record.vpn_ip = target.vpn_ip;

            let previous = record.last_endpoint.clone();
            let endpoint_changed = record.observe_endpoint(&target.endpoint);
            if endpoint_changed {
                stats.endpoint_updates += 1;
                info!(
                    peer = %key,
                    interface = %target.interface,
                    from = %previous,
                    to = %target.endpoint,
                    "peer endpoint changed"
                );
            }

            let handshake = parse_handshake(&target.latest_handshake, Utc::now());
            if let Some(handshake) = handshake {
                record.last_handshake = Some(handshake.at);
            }

            match gate(handshake.map(|h| h.age)) {
                Gate::Probe(age) => (age, endpoint_changed),
                Gate::Skip(status) => {
                    apply(record, status, None);
                    stats.skipped_offline += 1;
                    return Ok(PeerVerdict {
                        status,
                        pingable: false,
                        endpoint_changed,
                    });
                }
            }
        };

        let outcome = self.shared.prober.probe(target.vpn_ip).await;

        let mut guard = self.shared.book.lock().await;
        let HealthBook { records, stats } = &mut *guard;
        stats.record_probe(outcome.success);
        let record = records
            .get_mut(&key)
            .ok_or_else(|| MonitorError::PeerNotFound(key.clone()))?;
        record.record_probe(outcome.success, outcome.rtt_ms, Utc::now());

        let status = classify(age, outcome.success);
        let pingable = apply(record, status, Some(outcome.success));
        if !outcome.success {
            debug!(peer = %key, address = %target.vpn_ip, error = ?outcome.error, "probe failed");
        }

        Ok(PeerVerdict {
            status,
            pingable,
            endpoint_changed,
        })
    }

    // ── Queries ───────────────────────────────────────────────────

    /// Snapshot of one peer.
    pub async fn peer_health(&self, public_key: &str) -> Option<PeerHealthSnapshot> {
        self.shared
            .book
            .lock()
            .await
            .records
            .get(public_key)
            .map(PeerHealthRecord::snapshot)
    }

    /// Peers, interface configs and statistics, limited to interfaces that
    /// are currently up.
    pub async fn overview(&self) -> HealthOverview {
        let interfaces = match self.shared.tunnels.list_interfaces().await {
            Ok(interfaces) => interfaces,
            Err(e) => {
                warn!(error = %e, "failed to list tunnel interfaces");
                Vec::new()
            }
        };

        let mut overview = HealthOverview {
            running: self.is_running(),
            ..Default::default()
        };
        for interface in interfaces.iter().filter(|i| i.is_up) {
            match self.shared.configs.get_or_init(&interface.name).await {
                Ok(config) => {
                    overview.interfaces.insert(
                        interface.name.clone(),
                        InterfaceHealthView {
                            config,
                            interface_active: true,
                        },
                    );
                }
                Err(e) => warn!(interface = %interface.name, error = %e, "skipping interface"),
            }
        }

        let active: HashSet<&str> = interfaces
            .iter()
            .filter(|i| i.is_up)
            .map(|i| i.name.as_str())
            .collect();
        let book = self.shared.book.lock().await;
        overview.peers = book
            .records
            .iter()
            .filter(|(_, record)| active.contains(record.interface.as_str()))
            .map(|(key, record)| (key.clone(), record.snapshot()))
            .collect();
        overview.stats = book.stats.clone();
        overview
    }

    pub async fn stats(&self) -> MonitorStats {
        self.shared.book.lock().await.stats.clone()
    }

    /// Probe one known peer immediately, regardless of its handshake age.
    ///
    /// Only the probe fields and counters change; the classified status is
    /// left for the next cycle.
    pub async fn probe_now(&self, public_key: &str) -> MonitorResult<PeerHealthSnapshot> {
        let address = self
            .shared
            .book
            .lock()
            .await
            .records
            .get(public_key)
            .map(|record| record.vpn_ip)
            .ok_or_else(|| MonitorError::PeerNotFound(public_key.to_string()))?;

        let outcome = self.shared.prober.probe(address).await;

        let mut guard = self.shared.book.lock().await;
        let HealthBook { records, stats } = &mut *guard;
        stats.record_probe(outcome.success);
        let record = records
            .get_mut(public_key)
            .ok_or_else(|| MonitorError::PeerNotFound(public_key.to_string()))?;
        record.record_probe(outcome.success, outcome.rtt_ms, Utc::now());
        debug!(peer = %public_key, %address, success = outcome.success, "forced probe");
        Ok(record.snapshot())
    }

    // ── Interface configuration ───────────────────────────────────

    /// Config for an interface, materialising defaults on first access.
    pub async fn interface_config(&self, interface: &str) -> MonitorResult<InterfaceHealthConfig> {
        Ok(self.shared.configs.get_or_init(interface).await?)
    }

    /// Apply and persist a config update. Takes effect from the next cycle.
    pub async fn update_interface_config(
        &self,
        interface: &str,
        update: &ConfigUpdate,
    ) -> MonitorResult<InterfaceHealthConfig> {
        Ok(self.shared.configs.update(interface, update).await?)
    }
}

/// Drop records for peers the tunnel layer no longer reports. Returns how
/// many were removed.
fn evict_stale(records: &mut HashMap<String, PeerHealthRecord>, sighting: &Sighting) -> u32 {
    let before = records.len();
    records.retain(|key, record| {
        if !sighting.interfaces.contains(&record.interface) {
            return false;
        }
        match sighting.listed.get(&record.interface) {
            Some(keys) => keys.contains(key),
            None => true,
        }
    });
    let evicted = (before - records.len()) as u32;
    if evicted > 0 {
        info!(evicted, "evicted stale peer records");
    }
    evicted
}

/// Sleep for `duration` unless shutdown is signalled first. Returns `true`
/// if the full duration elapsed.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.changed() => false,
    }
}
