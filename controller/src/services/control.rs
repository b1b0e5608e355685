//! Control facade over the connection registry
//!
//! Every operation resolves the host, refuses it unless it is healthy and
//! turns the agent's reply into a typed result.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::core::{ConnectionRegistry, HostMetrics, RemoteConnection};
use crate::error::{ControllerError, ControllerResult};
use shared::{
    node_info, AgentInfo, AgentRequest, AgentResponse, HealthStatus, HostId, LogEntry, NodeId, ServerDescriptor,
    ServerResult, StartServerRequest, SystemMetrics,
};

pub struct ControlService {
    registry: Arc<ConnectionRegistry>,
}

impl ControlService {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    async fn healthy_connection(&self, host_id: HostId) -> ControllerResult<Arc<RemoteConnection>> {
        let connection = self
            .registry
            .get(host_id)
            .await
            .ok_or(ControllerError::HostNotFound { host_id })?;
        if !connection.is_healthy().await {
            return Err(ControllerError::HostUnhealthy {
                host_id,
                status: connection.status().await,
            });
        }
        Ok(connection)
    }

    fn operation_timeout(&self) -> Duration {
        self.registry.policy().operation_timeout
    }

    fn probe_timeout(&self) -> Duration {
        self.registry.policy().probe_timeout
    }

    async fn lifecycle(&self, host_id: HostId, request: AgentRequest) -> ControllerResult<Option<ServerDescriptor>> {
        let operation = request.name();
        let connection = self.healthy_connection(host_id).await?;
        match connection.invoke(request, self.operation_timeout()).await? {
            AgentResponse::ServerResult(ServerResult { success: true, server, .. }) => Ok(server),
            AgentResponse::ServerResult(ServerResult { message, .. }) => Err(ControllerError::OperationFailed {
                operation: operation.to_string(),
                message,
            }),
            _ => Err(unexpected(operation)),
        }
    }

    pub async fn start_server(&self, host_id: HostId, request: StartServerRequest) -> ControllerResult<ServerDescriptor> {
        let server_id = request.server_id.clone();
        let server = self
            .lifecycle(host_id, AgentRequest::StartServer(request))
            .await?
            .ok_or_else(|| unexpected("start_server"))?;
        node_info!(NodeId::current(), "Started server {} on host {}", server_id, host_id);
        Ok(server)
    }

    /// Stop a server, returning its final descriptor when the agent sends one
    pub async fn stop_server(&self, host_id: HostId, server_id: &str) -> ControllerResult<Option<ServerDescriptor>> {
        let request = AgentRequest::StopServer {
            server_id: server_id.to_string(),
        };
        let server = self.lifecycle(host_id, request).await?;
        node_info!(NodeId::current(), "Stopped server {} on host {}", server_id, host_id);
        Ok(server)
    }

    pub async fn restart_server(&self, host_id: HostId, server_id: &str) -> ControllerResult<ServerDescriptor> {
        let request = AgentRequest::RestartServer {
            server_id: server_id.to_string(),
        };
        let server = self
            .lifecycle(host_id, request)
            .await?
            .ok_or_else(|| unexpected("restart_server"))?;
        node_info!(NodeId::current(), "Restarted server {} on host {}", server_id, host_id);
        Ok(server)
    }

    /// Write one console line to a server, returning the agent's message
    pub async fn send_command(&self, host_id: HostId, server_id: &str, command: &str) -> ControllerResult<String> {
        let connection = self.healthy_connection(host_id).await?;
        let request = AgentRequest::SendCommand {
            server_id: server_id.to_string(),
            command: command.to_string(),
        };
        match connection.invoke(request, self.probe_timeout()).await? {
            AgentResponse::CommandResult(result) if result.success => Ok(result.message),
            AgentResponse::CommandResult(result) => Err(ControllerError::OperationFailed {
                operation: "send_command".to_string(),
                message: result.message,
            }),
            _ => Err(unexpected("send_command")),
        }
    }

    pub async fn server_status(&self, host_id: HostId, server_id: &str) -> ControllerResult<ServerDescriptor> {
        let connection = self.healthy_connection(host_id).await?;
        let request = AgentRequest::GetServer {
            server_id: server_id.to_string(),
        };
        match connection.invoke(request, self.probe_timeout()).await? {
            AgentResponse::Server(server) => Ok(server),
            _ => Err(unexpected("get_server")),
        }
    }

    pub async fn list_servers(&self, host_id: HostId) -> ControllerResult<Vec<ServerDescriptor>> {
        let connection = self.healthy_connection(host_id).await?;
        match connection.invoke(AgentRequest::ListServers, self.probe_timeout()).await? {
            AgentResponse::ServerList(servers) => Ok(servers),
            _ => Err(unexpected("list_servers")),
        }
    }

    pub async fn host_info(&self, host_id: HostId) -> ControllerResult<AgentInfo> {
        self.healthy_connection(host_id).await?.refresh_info().await
    }

    /// Fresh metrics straight from the agent
    pub async fn host_metrics(&self, host_id: HostId) -> ControllerResult<SystemMetrics> {
        self.healthy_connection(host_id).await?.update_metrics().await
    }

    /// Metrics as of the last health check
    pub async fn cached_metrics(&self, host_id: HostId) -> ControllerResult<HostMetrics> {
        Ok(self.healthy_connection(host_id).await?.metrics().await)
    }

    pub async fn host_health(&self, host_id: HostId) -> ControllerResult<HealthStatus> {
        let connection = self.healthy_connection(host_id).await?;
        match connection.invoke(AgentRequest::HealthCheck, self.probe_timeout()).await? {
            AgentResponse::Health(health) => Ok(health),
            _ => Err(unexpected("health_check")),
        }
    }

    /// Follow a server's console; the receiver closes when the server exits
    pub async fn stream_logs(&self, host_id: HostId, server_id: &str) -> ControllerResult<mpsc::Receiver<LogEntry>> {
        self.healthy_connection(host_id).await?.stream_logs(server_id).await
    }
}

fn unexpected(operation: &str) -> ControllerError {
    ControllerError::UnexpectedResponse {
        operation: operation.to_string(),
    }
}
