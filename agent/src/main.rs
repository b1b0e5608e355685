//! Main entry point for the host agent binary

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use agent::{services::RpcServer, Agent, AgentConfig, AgentResult};
use shared::{logging, node_debug, node_warn, NodeId};

/// Host agent supervising game server processes
#[derive(Parser)]
#[command(name = "agent")]
#[command(about = "Supervises game server processes and serves controller requests")]
pub struct Args {
    /// JSON configuration file
    #[arg(long, default_value = "/etc/aymc/agent.json")]
    pub config: PathBuf,

    /// Listen port (overrides the configuration file)
    #[arg(long)]
    pub port: Option<u16>,

    /// Agent id (overrides the configuration file)
    #[arg(long)]
    pub agent_id: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

#[tokio::main]
async fn main() -> AgentResult<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let (mut config, config_error) = match AgentConfig::load(&args.config) {
        Ok(config) => (config, None),
        Err(e) => (AgentConfig::default(), Some(e)),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(agent_id) = args.agent_id {
        config.agent_id = agent_id;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    config.validate()?;

    NodeId::init_agent(config.agent_id.clone());
    logging::init_tracing(Some(&config.log_level));

    if let Some(e) = config_error {
        node_warn!(NodeId::current(), "Using default configuration ({})", e);
    }
    logging::log_startup(NodeId::current(), &format!("agent v{}", agent::agent::AGENT_VERSION));
    node_debug!(
        NodeId::current(),
        "Work dir: {}, max servers: {}",
        config.work_dir.display(),
        config.max_servers
    );

    tokio::fs::create_dir_all(&config.work_dir).await?;

    let listen_address = config.listen_address();
    let agent = Arc::new(Agent::from_config(config));
    let shutdown = CancellationToken::new();

    let server = RpcServer::bind(Arc::clone(&agent), &listen_address, shutdown.clone()).await?;
    let server_task = tokio::spawn(server.serve());

    let metrics_agent = Arc::clone(&agent);
    let metrics_token = shutdown.clone();
    let metrics_task = tokio::spawn(async move { metrics_agent.run_metrics_loop(metrics_token).await });

    let reason = wait_for_signal().await;
    logging::log_shutdown(NodeId::current(), reason);

    shutdown.cancel();
    agent.shutdown().await;
    let _ = metrics_task.await;
    match server_task.await {
        Ok(result) => result?,
        Err(e) => logging::log_error(NodeId::current(), "RPC server task", &e),
    }

    logging::log_success(NodeId::current(), "Agent stopped gracefully");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => tokio::select! {
            _ = tokio::signal::ctrl_c() => "Received Ctrl+C signal",
            _ = terminate.recv() => "Received SIGTERM",
        },
        Err(e) => {
            logging::log_error(NodeId::current(), "SIGTERM handler", &e);
            let _ = tokio::signal::ctrl_c().await;
            "Received Ctrl+C signal"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "Received Ctrl+C signal"
}
