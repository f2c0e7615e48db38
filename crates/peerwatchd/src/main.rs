//! peerwatchd — the Peerwatch daemon.
//!
//! Single binary that assembles the Peerwatch subsystems:
//! - Interface config store (INI settings file)
//! - `wg`/`awg` tunnel source
//! - ICMP prober
//! - Health monitor
//! - REST API
//!
//! # Usage
//!
//! ```text
//! peerwatchd --config /etc/peerwatch/peerwatch.toml run
//! peerwatchd cycle
//! peerwatchd probe 10.0.0.2
//! ```

mod config;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use peerwatch_health::{HealthMonitor, PingProber, Prober};
use peerwatch_state::InterfaceConfigStore;
use peerwatch_tunnel::{CommandRunner, WgCli};

use crate::config::DaemonConfig;

const DEFAULT_LOG_FILTER: &str = "info,peerwatchd=debug,peerwatch=debug";

/// Timeout for `wg`/`awg` invocations.
const TUNNEL_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "peerwatchd", about = "WireGuard peer health monitor", version)]
struct Cli {
    /// Path to peerwatch.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitor and the API server until Ctrl-C.
    Run,
    /// Run a single monitoring cycle and print its report.
    Cycle,
    /// Probe one address and print the outcome.
    Probe {
        /// VPN address to probe.
        address: IpAddr,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = DaemonConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run => run(config).await,
        Command::Cycle => {
            let monitor = build_monitor(&config)?;
            let report = monitor.force_cycle().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Probe { address } => {
            let prober = PingProber::new(
                CommandRunner::new(TUNNEL_COMMAND_TIMEOUT),
                config.probe_settings(),
            );
            let outcome = prober.probe(address).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn build_monitor(config: &DaemonConfig) -> anyhow::Result<HealthMonitor> {
    let store = InterfaceConfigStore::open(&config.settings.path)
        .with_context(|| format!("opening settings file {}", config.settings.path.display()))?;
    info!(path = %config.settings.path.display(), "interface config store opened");

    let runner = CommandRunner::new(TUNNEL_COMMAND_TIMEOUT);
    let tunnels = WgCli::new(runner.clone(), config.wg_interfaces()?);
    let prober = PingProber::new(runner, config.probe_settings());

    Ok(HealthMonitor::new(
        Arc::new(tunnels),
        Arc::new(prober),
        store,
        config.monitor_settings(),
    ))
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!("Peerwatch daemon starting");

    let monitor = build_monitor(&config)?;
    monitor.start().await;

    // ── Start API server ───────────────────────────────────────

    let router = peerwatch_api::build_router(monitor.clone());
    let addr = config.api.listen;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "API server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor.stop().await;
    info!("Peerwatch daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
