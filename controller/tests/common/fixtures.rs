//! Test data shared by the controller integration suites

use std::net::SocketAddr;
use std::time::Duration;

use controller::{ConnectionPolicy, HostRecord};
use shared::{HostId, HostStatus, ServerConfig, StartServerRequest, SystemMetrics};

pub struct TestFixtures;

impl TestFixtures {
    pub const AGENT_ID: &'static str = "e2e-host";

    /// Console that echoes commands and exits on `stop`
    pub const CONSOLE: &'static str = r#"echo ready
while read line; do
  if [ "$line" = "stop" ]; then exit 0; fi
  echo "got $line"
done"#;

    /// Console that never prints anything
    pub const QUIET: &'static str = "while read line; do :; done";

    /// Upper bound for any single step of a test
    pub const STEP_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn policy() -> ConnectionPolicy {
        ConnectionPolicy {
            dial_timeout: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(2),
            operation_timeout: Duration::from_secs(20),
            ..ConnectionPolicy::default()
        }
    }

    pub fn host(address: SocketAddr) -> HostRecord {
        HostRecord {
            id: HostId::new(),
            agent_id: Self::AGENT_ID.to_string(),
            hostname: "e2e".to_string(),
            ip_address: address.ip().to_string(),
            port: address.port(),
            status: HostStatus::Offline,
            last_seen: None,
        }
    }

    pub fn start_request(server_id: &str) -> StartServerRequest {
        StartServerRequest {
            server_id: server_id.to_string(),
            name: format!("Server {server_id}"),
            server_type: "paper".to_string(),
            version: "1.20.4".to_string(),
            port: 25565,
            config: ServerConfig::default(),
        }
    }

    pub fn metrics() -> SystemMetrics {
        SystemMetrics {
            timestamp: 1,
            cpu_percent: 20.0,
            memory_total: 4096,
            memory_used: 1024,
            memory_percent: 25.0,
            process_count: 7,
            ..SystemMetrics::default()
        }
    }
}
