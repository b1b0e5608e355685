//! Host agent facade
//!
//! Ties the server registry, the metrics source and the agent configuration
//! together and answers controller requests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::core::launch::JavaLauncher;
use crate::core::log_buffer::LogFollower;
use crate::core::registry::ServerRegistry;
use crate::core::supervisor::ProcessSupervisor;
use crate::error::AgentResult;
use crate::services::system_monitor::{platform, SysinfoMetrics};
use crate::traits::{LaunchBuilder, MetricsSource};
use shared::{
    node_debug, node_info, node_warn, unix_now, AgentInfo, AgentRequest, AgentResponse, CommandResult, HealthStatus,
    LogEntry, NodeId, Pong, ServerResult,
};

pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Agent {
    config: AgentConfig,
    registry: Arc<ServerRegistry>,
    metrics: Arc<dyn MetricsSource>,
    started: Instant,
}

impl Agent {
    pub fn new(config: AgentConfig, registry: Arc<ServerRegistry>, metrics: Arc<dyn MetricsSource>) -> Self {
        Self {
            config,
            registry,
            metrics,
            started: Instant::now(),
        }
    }

    /// Build the production agent: JVM launcher, real supervisor, sysinfo metrics
    pub fn from_config(config: AgentConfig) -> Self {
        let launcher: Arc<dyn LaunchBuilder> = Arc::new(JavaLauncher::new(config.java_path.clone()));
        Self::with_launcher(config, launcher, Arc::new(SysinfoMetrics::new()))
    }

    pub fn with_launcher(config: AgentConfig, launcher: Arc<dyn LaunchBuilder>, metrics: Arc<dyn MetricsSource>) -> Self {
        let supervisor = ProcessSupervisor::new(config.work_dir.clone(), launcher)
            .with_timeouts(config.stop_timeouts())
            .with_log_capacity(config.log_buffer_capacity)
            .with_env(config.custom_env.clone());
        let registry = ServerRegistry::with_restart_policy(
            config.agent_id.clone(),
            config.max_servers,
            Arc::new(supervisor),
            config.restart_policy(),
        );
        Self::new(config, Arc::new(registry), metrics)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub async fn info(&self) -> AgentInfo {
        AgentInfo {
            agent_id: self.config.agent_id.clone(),
            version: AGENT_VERSION.to_string(),
            platform: platform(),
            uptime_seconds: self.uptime().as_secs(),
            active_servers: self.registry.count().await as u32,
            max_servers: self.config.max_servers as u32,
        }
    }

    pub async fn health(&self) -> HealthStatus {
        let mut checks = BTreeMap::new();
        checks.insert("agent".to_string(), "ok".to_string());

        let running = self.registry.supervisor().count().await;
        checks.insert(
            "servers".to_string(),
            format!("{running}/{} running", self.config.max_servers),
        );

        let work_dir_ok = self.config.work_dir.is_dir();
        checks.insert(
            "work_dir".to_string(),
            if work_dir_ok { "ok" } else { "missing" }.to_string(),
        );

        HealthStatus {
            healthy: work_dir_ok,
            status: if work_dir_ok { "healthy" } else { "degraded" }.to_string(),
            checks,
            timestamp: unix_now(),
        }
    }

    /// Follow a server's console output
    pub async fn follow_logs(&self, server_id: &str) -> AgentResult<LogFollower<LogEntry>> {
        self.registry.follow_logs(server_id).await
    }

    /// Answer one controller request
    ///
    /// `StreamLogs` is not handled here; it needs the connection itself.
    pub async fn handle(&self, request: AgentRequest) -> AgentResponse {
        node_debug!(NodeId::current(), "Handling {}", request.name());

        match request {
            AgentRequest::Ping => AgentResponse::Pong(Pong {
                timestamp: unix_now(),
                message: "pong".to_string(),
            }),
            AgentRequest::GetSystemMetrics => match self.metrics.collect().await {
                Ok(metrics) => AgentResponse::SystemMetrics(metrics),
                Err(e) => AgentResponse::error(e.to_string()),
            },
            AgentRequest::GetAgentInfo => AgentResponse::AgentInfo(self.info().await),
            AgentRequest::HealthCheck => AgentResponse::Health(self.health().await),
            AgentRequest::ListServers => AgentResponse::ServerList(self.registry.list().await),
            AgentRequest::GetServer { server_id } => match self.registry.get(&server_id).await {
                Ok(server) => AgentResponse::Server(server),
                Err(e) => AgentResponse::error(e.to_string()),
            },
            AgentRequest::StartServer(request) => {
                let server_id = request.server_id.clone();
                match self.registry.start(request).await {
                    Ok(server) => AgentResponse::ServerResult(ServerResult::ok("Server started", Some(server))),
                    Err(e) => {
                        node_warn!(NodeId::current(), "Start of {} refused: {}", server_id, e);
                        AgentResponse::ServerResult(ServerResult::failed(e.to_string()))
                    }
                }
            }
            AgentRequest::StopServer { server_id } => match self.registry.stop(&server_id).await {
                Ok(server) => AgentResponse::ServerResult(ServerResult::ok("Server stopped", Some(server))),
                Err(e) => AgentResponse::ServerResult(ServerResult::failed(e.to_string())),
            },
            AgentRequest::RestartServer { server_id } => match self.registry.restart(&server_id).await {
                Ok(server) => AgentResponse::ServerResult(ServerResult::ok("Server restarted", Some(server))),
                Err(e) => AgentResponse::ServerResult(ServerResult::failed(e.to_string())),
            },
            AgentRequest::SendCommand { server_id, command } => {
                match self.registry.send_command(&server_id, &command).await {
                    Ok(()) => AgentResponse::CommandResult(CommandResult {
                        success: true,
                        message: "Command sent".to_string(),
                    }),
                    Err(e) => AgentResponse::CommandResult(CommandResult {
                        success: false,
                        message: e.to_string(),
                    }),
                }
            }
            AgentRequest::StreamLogs { .. } => {
                AgentResponse::error("stream_logs is only served on its own connection")
            }
        }
    }

    /// Periodically sample host metrics into the debug log until cancelled
    pub async fn run_metrics_loop(&self, cancel: CancellationToken) {
        if !self.config.enable_metrics {
            return;
        }

        let mut ticker = tokio::time::interval(self.config.metrics_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        node_info!(
            NodeId::current(),
            "📊 Metrics sampling every {:?}",
            self.config.metrics_interval()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => match self.metrics.collect().await {
                    Ok(m) => node_debug!(
                        NodeId::current(),
                        "CPU: {:.2}%, RAM: {:.2}%, Disk: {:.2}%",
                        m.cpu_percent,
                        m.memory_percent,
                        m.disk_percent
                    ),
                    Err(e) => node_warn!(NodeId::current(), "Metrics sampling failed: {}", e),
                }
            }
        }
    }

    /// Stop every server this agent runs
    pub async fn shutdown(&self) {
        let stopped = self.registry.shutdown().await;
        node_info!(NodeId::current(), "Stopped {} server(s)", stopped);
    }
}
