//! Main entry point for the controller binary

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use controller::{ConnectionRegistry, ControllerConfig, HealthMonitor, MemoryStatusStore, TcpConnector};
use shared::{logging, node_info, node_warn, NodeId};

/// Central controller watching host agents
#[derive(Parser)]
#[command(name = "controller")]
#[command(about = "Connects to host agents and monitors their health")]
pub struct Args {
    /// JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// JSON hosts file (overrides the configuration file)
    #[arg(long)]
    pub hosts: Option<PathBuf>,

    /// Health check interval in seconds (overrides the configuration file)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ControllerConfig::load(path).context("Failed to load controller configuration")?,
        None => ControllerConfig::default(),
    };
    if let Some(hosts) = args.hosts {
        config.hosts_file = Some(hosts);
    }
    if let Some(interval) = args.interval {
        config.check_interval_secs = interval;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    config.validate()?;

    NodeId::init_controller();
    logging::init_tracing(Some(&config.log_level));
    logging::log_startup(NodeId::current(), &format!("controller v{}", env!("CARGO_PKG_VERSION")));

    let store = match &config.hosts_file {
        Some(path) => MemoryStatusStore::from_file(path)
            .with_context(|| format!("Failed to read hosts file {}", path.display()))?,
        None => {
            node_warn!(NodeId::current(), "No hosts file configured, starting with no hosts");
            MemoryStatusStore::new()
        }
    };

    let registry = Arc::new(ConnectionRegistry::new(
        Arc::new(TcpConnector::new()),
        Arc::new(store),
        config.policy(),
    ));
    let connected = registry.load_from_store().await?;
    node_info!(
        NodeId::current(),
        "Connected to {} of {} hosts",
        connected,
        registry.count().await
    );

    let monitor = Arc::new(HealthMonitor::new(Arc::clone(&registry)));
    monitor.start().await;

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
    logging::log_shutdown(NodeId::current(), "Received Ctrl+C signal");

    monitor.stop().await;
    registry.shutdown().await;

    logging::log_success(NodeId::current(), "Controller stopped gracefully");
    Ok(())
}
