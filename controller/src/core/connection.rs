//! Controller-side connection to one host agent
//!
//! Holds the channel, the reachability bookkeeping (status, last contact,
//! consecutive probe failures) and the last metrics the host reported. All of
//! it lives behind one reader-writer lock so concurrent readers always see a
//! consistent view.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;

use crate::error::{ControllerError, ControllerResult};
use crate::traits::{AgentClient, Connector, HostRecord};
use shared::{node_debug, node_warn, AgentInfo, AgentRequest, AgentResponse, HostId, HostStatus, LogEntry, NodeId, SystemMetrics};

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Last contact must be within this many check intervals for a host to be healthy
pub const RECENCY_INTERVALS: u32 = 4;

/// Timeouts and thresholds shared by connections and the health monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionPolicy {
    pub dial_timeout: Duration,
    /// Bound on probes, metrics and info requests
    pub probe_timeout: Duration,
    /// Bound on server lifecycle requests, which may wait out a graceful stop
    pub operation_timeout: Duration,
    pub check_interval: Duration,
    pub failure_threshold: u32,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            check_interval: DEFAULT_CHECK_INTERVAL,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

impl ConnectionPolicy {
    pub fn recency_window(&self) -> Duration {
        self.check_interval * RECENCY_INTERVALS
    }
}

/// Last reported resource usage of a host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostMetrics {
    pub system: SystemMetrics,
    pub active_servers: u32,
    pub max_servers: u32,
    pub agent_uptime_seconds: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Consistent point-in-time view of a connection
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub host_id: HostId,
    pub status: HostStatus,
    pub consecutive_failures: u32,
    pub last_seen: Option<Instant>,
    pub connected: bool,
    pub metrics: HostMetrics,
    pub info: Option<AgentInfo>,
}

struct ConnectionState {
    client: Option<Arc<dyn AgentClient>>,
    status: HostStatus,
    last_seen: Option<Instant>,
    consecutive_failures: u32,
    metrics: HostMetrics,
    info: Option<AgentInfo>,
}

pub struct RemoteConnection {
    host: HostRecord,
    connector: Arc<dyn Connector>,
    policy: ConnectionPolicy,
    state: RwLock<ConnectionState>,
}

impl RemoteConnection {
    /// New, not yet dialed connection in status `Offline`
    pub fn new(host: HostRecord, connector: Arc<dyn Connector>, policy: ConnectionPolicy) -> Self {
        Self {
            host,
            connector,
            policy,
            state: RwLock::new(ConnectionState {
                client: None,
                status: HostStatus::Offline,
                last_seen: None,
                consecutive_failures: 0,
                metrics: HostMetrics::default(),
                info: None,
            }),
        }
    }

    pub fn host(&self) -> &HostRecord {
        &self.host
    }

    pub fn id(&self) -> HostId {
        self.host.id
    }

    pub fn policy(&self) -> &ConnectionPolicy {
        &self.policy
    }

    pub async fn status(&self) -> HostStatus {
        self.state.read().await.status
    }

    pub async fn consecutive_failures(&self) -> u32 {
        self.state.read().await.consecutive_failures
    }

    pub async fn last_seen(&self) -> Option<Instant> {
        self.state.read().await.last_seen
    }

    pub async fn metrics(&self) -> HostMetrics {
        self.state.read().await.metrics.clone()
    }

    pub async fn info(&self) -> Option<AgentInfo> {
        self.state.read().await.info.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.client.is_some()
    }

    pub async fn snapshot(&self) -> ConnectionSnapshot {
        let state = self.state.read().await;
        ConnectionSnapshot {
            host_id: self.host.id,
            status: state.status,
            consecutive_failures: state.consecutive_failures,
            last_seen: state.last_seen,
            connected: state.client.is_some(),
            metrics: state.metrics.clone(),
            info: state.info.clone(),
        }
    }

    /// Online, under the failure threshold and heard from recently
    pub async fn is_healthy(&self) -> bool {
        let state = self.state.read().await;
        state.status == HostStatus::Online
            && state.consecutive_failures < self.policy.failure_threshold
            && state
                .last_seen
                .is_some_and(|seen| seen.elapsed() < self.policy.recency_window())
    }

    /// Claim the connection for dialing when its status is one of `from`
    ///
    /// The status flips to `Connecting` under the same lock, so two callers
    /// can never dial the same host at once.
    pub(crate) async fn try_claim_dial(&self, from: &[HostStatus]) -> bool {
        let mut state = self.state.write().await;
        if state.status == HostStatus::Connecting || !from.contains(&state.status) {
            return false;
        }
        state.status = HostStatus::Connecting;
        true
    }

    /// Dial (or redial) the agent
    pub async fn connect(&self) -> ControllerResult<()> {
        let from = [HostStatus::Offline, HostStatus::Online, HostStatus::Error];
        if !self.try_claim_dial(&from).await {
            return Err(ControllerError::ConnectInProgress { host_id: self.host.id });
        }
        self.finish_connect().await
    }

    /// Second half of [`connect`](Self::connect), for callers that already
    /// hold the dial claim
    pub(crate) async fn finish_connect(&self) -> ControllerResult<()> {
        let previous = self.state.write().await.client.take();
        if let Some(previous) = previous {
            previous.close().await;
        }

        let address = self.host.address();
        match self.connector.dial(&address, self.policy.dial_timeout).await {
            Ok(client) => {
                {
                    let mut state = self.state.write().await;
                    state.client = Some(client);
                    state.status = HostStatus::Online;
                    state.consecutive_failures = 0;
                    state.last_seen = Some(Instant::now());
                }
                if let Err(e) = self.refresh_info().await {
                    node_warn!(NodeId::current(), "Agent info from {} unavailable: {}", self.host.hostname, e);
                }
                Ok(())
            }
            Err(e) => {
                self.state.write().await.status = HostStatus::Error;
                Err(e)
            }
        }
    }

    /// Close the channel and mark the host offline
    pub async fn disconnect(&self) {
        let client = {
            let mut state = self.state.write().await;
            state.status = HostStatus::Offline;
            state.client.take()
        };
        if let Some(client) = client {
            client.close().await;
        }
    }

    /// Channel for dispatch, `NotConnected` when none is open
    pub async fn client(&self) -> ControllerResult<Arc<dyn AgentClient>> {
        self.state
            .read()
            .await
            .client
            .clone()
            .ok_or(ControllerError::NotConnected { host_id: self.host.id })
    }

    async fn record_failure(&self) -> u32 {
        let mut state = self.state.write().await;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.consecutive_failures
    }

    /// Ping the agent, returning the round trip time
    ///
    /// Success resets the failure counter, refreshes the last contact time
    /// and marks the host online. Any failure bumps the counter.
    pub async fn probe(&self) -> ControllerResult<Duration> {
        let client = match self.client().await {
            Ok(client) => client,
            Err(e) => {
                self.record_failure().await;
                return Err(e);
            }
        };

        let started = Instant::now();
        let result = client.call(AgentRequest::Ping, self.policy.probe_timeout).await;
        let error = match result {
            Ok(AgentResponse::Pong(_)) => {
                let mut state = self.state.write().await;
                state.consecutive_failures = 0;
                state.last_seen = Some(Instant::now());
                state.status = HostStatus::Online;
                return Ok(started.elapsed());
            }
            Ok(AgentResponse::Error { message }) => ControllerError::RemoteError { message },
            Ok(_) => ControllerError::UnexpectedResponse {
                operation: "ping".to_string(),
            },
            Err(e) => e,
        };

        let failures = self.record_failure().await;
        node_debug!(
            NodeId::current(),
            "Probe of {} failed ({} in a row): {}",
            self.host.hostname,
            failures,
            error
        );
        Err(error)
    }

    /// Fetch host metrics into the cache
    pub async fn update_metrics(&self) -> ControllerResult<SystemMetrics> {
        let client = self.client().await?;
        match client.call(AgentRequest::GetSystemMetrics, self.policy.probe_timeout).await? {
            AgentResponse::SystemMetrics(metrics) => {
                let mut state = self.state.write().await;
                state.metrics.system = metrics.clone();
                state.metrics.updated_at = Some(Utc::now());
                Ok(metrics)
            }
            AgentResponse::Error { message } => Err(ControllerError::RemoteError { message }),
            _ => Err(ControllerError::UnexpectedResponse {
                operation: "get_system_metrics".to_string(),
            }),
        }
    }

    /// Fetch agent facts (version, load, capacity) into the cache
    pub async fn refresh_info(&self) -> ControllerResult<AgentInfo> {
        let client = self.client().await?;
        match client.call(AgentRequest::GetAgentInfo, self.policy.probe_timeout).await? {
            AgentResponse::AgentInfo(info) => {
                let mut state = self.state.write().await;
                state.metrics.active_servers = info.active_servers;
                state.metrics.max_servers = info.max_servers;
                state.metrics.agent_uptime_seconds = info.uptime_seconds;
                state.info = Some(info.clone());
                Ok(info)
            }
            AgentResponse::Error { message } => Err(ControllerError::RemoteError { message }),
            _ => Err(ControllerError::UnexpectedResponse {
                operation: "get_agent_info".to_string(),
            }),
        }
    }

    /// Mark the host offline while keeping the channel for later probes
    pub async fn mark_offline(&self) {
        self.state.write().await.status = HostStatus::Offline;
    }

    /// Send one request to the agent
    ///
    /// Transport failures count against the host like failed probes. An
    /// `Error` reply comes back as [`ControllerError::RemoteError`].
    pub async fn invoke(&self, request: AgentRequest, timeout: Duration) -> ControllerResult<AgentResponse> {
        let client = self.client().await?;
        match client.call(request, timeout).await {
            Ok(AgentResponse::Error { message }) => Err(ControllerError::RemoteError { message }),
            Ok(response) => Ok(response),
            Err(e) => {
                if e.is_transport() {
                    self.record_failure().await;
                }
                Err(e)
            }
        }
    }

    pub async fn stream_logs(&self, server_id: &str) -> ControllerResult<mpsc::Receiver<LogEntry>> {
        self.client().await?.stream_logs(server_id).await
    }
}
