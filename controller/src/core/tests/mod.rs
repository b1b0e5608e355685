//! Connection, registry and monitor tests
//!
//! Agents are simulated in memory: a [`common::FakeNetwork`] hands out
//! [`common::FakeAgent`]s by address, and each agent can be made
//! unreachable to fail dials and time out calls.

mod connection;
mod registry;

pub mod common {
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;

    use crate::core::connection::ConnectionPolicy;
    use crate::core::registry::ConnectionRegistry;
    use crate::error::{ControllerError, ControllerResult};
    use crate::services::MemoryStatusStore;
    use crate::traits::{AgentClient, Connector, HostRecord};
    use shared::{AgentInfo, AgentRequest, AgentResponse, HostId, HostStatus, LogEntry, Pong, SystemMetrics};

    pub struct FakeAgent {
        agent_id: String,
        reachable: AtomicBool,
        active_servers: AtomicU32,
        calls: AtomicU32,
    }

    impl FakeAgent {
        pub fn set_reachable(&self, reachable: bool) {
            self.reachable.store(reachable, Ordering::SeqCst);
        }

        pub fn is_reachable(&self) -> bool {
            self.reachable.load(Ordering::SeqCst)
        }

        pub fn set_active_servers(&self, count: u32) {
            self.active_servers.store(count, Ordering::SeqCst);
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    pub fn sample_metrics() -> SystemMetrics {
        SystemMetrics {
            timestamp: 1_700_000_000,
            cpu_percent: 37.5,
            memory_total: 8 * 1024 * 1024 * 1024,
            memory_used: 2 * 1024 * 1024 * 1024,
            memory_percent: 25.0,
            ..SystemMetrics::default()
        }
    }

    #[async_trait]
    impl AgentClient for FakeAgent {
        async fn call(&self, request: AgentRequest, timeout: Duration) -> ControllerResult<AgentResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.is_reachable() {
                return Err(ControllerError::timeout(request.name(), timeout));
            }
            Ok(match request {
                AgentRequest::Ping => AgentResponse::Pong(Pong {
                    timestamp: 1,
                    message: "pong".to_string(),
                }),
                AgentRequest::GetSystemMetrics => AgentResponse::SystemMetrics(sample_metrics()),
                AgentRequest::GetAgentInfo => AgentResponse::AgentInfo(AgentInfo {
                    agent_id: self.agent_id.clone(),
                    version: "0.1.0".to_string(),
                    platform: "linux".to_string(),
                    uptime_seconds: 600,
                    active_servers: self.active_servers.load(Ordering::SeqCst),
                    max_servers: 10,
                }),
                other => AgentResponse::error(format!("{} not supported", other.name())),
            })
        }

        async fn stream_logs(&self, _server_id: &str) -> ControllerResult<mpsc::Receiver<LogEntry>> {
            Err(ControllerError::RemoteError {
                message: "not supported".to_string(),
            })
        }

        async fn close(&self) {}
    }

    /// Address book of fake agents
    #[derive(Default)]
    pub struct FakeNetwork {
        agents: Mutex<HashMap<String, Arc<FakeAgent>>>,
        dials: AtomicU32,
    }

    impl FakeNetwork {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Agent serving `host`, created reachable on first use
        pub fn agent(&self, host: &HostRecord) -> Arc<FakeAgent> {
            let mut agents = self.agents.lock().unwrap();
            let agent = agents.entry(host.address()).or_insert_with(|| {
                Arc::new(FakeAgent {
                    agent_id: host.agent_id.clone(),
                    reachable: AtomicBool::new(true),
                    active_servers: AtomicU32::new(0),
                    calls: AtomicU32::new(0),
                })
            });
            Arc::clone(agent)
        }

        pub fn dials(&self) -> u32 {
            self.dials.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for FakeNetwork {
        async fn dial(&self, address: &str, _timeout: Duration) -> ControllerResult<Arc<dyn AgentClient>> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            let agent = self.agents.lock().unwrap().get(address).cloned();
            match agent {
                Some(agent) if agent.is_reachable() => Ok(agent as Arc<dyn AgentClient>),
                _ => Err(ControllerError::DialFailed {
                    address: address.to_string(),
                    reason: "connection refused".to_string(),
                }),
            }
        }
    }

    /// Host record with a unique port so every host gets its own address
    pub fn host(hostname: &str, port: u16) -> HostRecord {
        HostRecord {
            id: HostId::new(),
            agent_id: format!("agent-{hostname}"),
            hostname: hostname.to_string(),
            ip_address: "10.0.0.1".to_string(),
            port,
            status: HostStatus::Offline,
            last_seen: None,
        }
    }

    pub fn policy() -> ConnectionPolicy {
        ConnectionPolicy::default()
    }

    pub fn registry(network: &Arc<FakeNetwork>, store: &Arc<MemoryStatusStore>) -> Arc<ConnectionRegistry> {
        Arc::new(ConnectionRegistry::new(
            Arc::clone(network) as Arc<dyn Connector>,
            Arc::clone(store) as Arc<dyn crate::traits::StatusStore>,
            policy(),
        ))
    }
}
