//! Agent RPC envelopes
//!
//! Every request is answered by exactly one response, except `StreamLogs`,
//! which switches the connection to streaming: the agent answers with
//! `StreamStarted` (or `Error`), then sends any number of `LogEntry` frames
//! followed by `EndOfStream`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::logs::LogEntry;
use super::metrics::SystemMetrics;
use crate::types::{ServerDescriptor, StartServerRequest};

/// Controller -> Agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentRequest {
    Ping,
    GetSystemMetrics,
    GetAgentInfo,
    HealthCheck,
    ListServers,
    GetServer { server_id: String },
    StartServer(StartServerRequest),
    StopServer { server_id: String },
    RestartServer { server_id: String },
    SendCommand { server_id: String, command: String },
    StreamLogs { server_id: String },
}

impl AgentRequest {
    /// Short operation name for logs
    pub fn name(&self) -> &'static str {
        match self {
            AgentRequest::Ping => "ping",
            AgentRequest::GetSystemMetrics => "get_system_metrics",
            AgentRequest::GetAgentInfo => "get_agent_info",
            AgentRequest::HealthCheck => "health_check",
            AgentRequest::ListServers => "list_servers",
            AgentRequest::GetServer { .. } => "get_server",
            AgentRequest::StartServer(_) => "start_server",
            AgentRequest::StopServer { .. } => "stop_server",
            AgentRequest::RestartServer { .. } => "restart_server",
            AgentRequest::SendCommand { .. } => "send_command",
            AgentRequest::StreamLogs { .. } => "stream_logs",
        }
    }
}

/// Agent -> Controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentResponse {
    Pong(Pong),
    SystemMetrics(SystemMetrics),
    AgentInfo(AgentInfo),
    Health(HealthStatus),
    ServerList(Vec<ServerDescriptor>),
    Server(ServerDescriptor),
    ServerResult(ServerResult),
    CommandResult(CommandResult),
    /// The log stream is attached; entries follow as they are written
    StreamStarted,
    LogEntry(LogEntry),
    EndOfStream,
    Error { message: String },
}

impl AgentResponse {
    pub fn error(message: impl Into<String>) -> Self {
        AgentResponse::Error { message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub timestamp: u64,
    pub message: String,
}

/// Static facts about an agent plus its current load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_id: String,
    pub version: String,
    pub platform: String,
    pub uptime_seconds: u64,
    pub active_servers: u32,
    pub max_servers: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub status: String,
    pub checks: BTreeMap<String, String>,
    pub timestamp: u64,
}

/// Outcome of a server lifecycle operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerResult {
    pub success: bool,
    pub message: String,
    pub server: Option<ServerDescriptor>,
}

impl ServerResult {
    pub fn ok(message: impl Into<String>, server: Option<ServerDescriptor>) -> Self {
        Self { success: true, message: message.into(), server }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), server: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
}
