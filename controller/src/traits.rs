//! Trait definitions with mockall annotations for testing
//!
//! The controller talks to agents through [`AgentClient`], opens those
//! clients through a [`Connector`] and persists host status through a
//! [`StatusStore`]. All three are injected so the connection logic can be
//! tested without sockets or a database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::ControllerResult;
use shared::{AgentRequest, AgentResponse, HostId, HostStatus, LogEntry};

/// A host as recorded by the status store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    pub id: HostId,
    /// Agent id the host reports for itself
    pub agent_id: String,
    pub hostname: String,
    pub ip_address: String,
    pub port: u16,
    pub status: HostStatus,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl HostRecord {
    /// `ip:port` of the agent endpoint
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip_address, self.port)
    }
}

/// Open channel to one agent
#[mockall::automock]
#[async_trait::async_trait]
pub trait AgentClient: Send + Sync {
    /// One request/response exchange, bounded by `timeout`
    async fn call(&self, request: AgentRequest, timeout: Duration) -> ControllerResult<AgentResponse>;

    /// Follow a server's console on a dedicated stream
    ///
    /// The receiver closes when the server exits or the stream breaks.
    async fn stream_logs(&self, server_id: &str) -> ControllerResult<mpsc::Receiver<LogEntry>>;

    /// Release the channel; later calls may fail or reopen it
    async fn close(&self);
}

/// Opens agent clients
#[mockall::automock]
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn dial(&self, address: &str, timeout: Duration) -> ControllerResult<Arc<dyn AgentClient>>;
}

/// Durable record of host status
#[mockall::automock]
#[async_trait::async_trait]
pub trait StatusStore: Send + Sync {
    async fn update_status(&self, host_id: HostId, status: HostStatus) -> ControllerResult<()>;

    async fn update_last_seen(&self, host_id: HostId, seen_at: DateTime<Utc>) -> ControllerResult<()>;

    async fn load_hosts(&self) -> ControllerResult<Vec<HostRecord>>;
}
