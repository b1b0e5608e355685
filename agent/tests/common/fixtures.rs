//! Test data shared by the agent integration suites

use shared::{ServerConfig, StartServerRequest, SystemMetrics};

pub struct TestFixtures;

impl TestFixtures {
    pub const AGENT_ID: &'static str = "it-host";

    /// Console that stays up until it reads `stop`
    pub const CONSOLE: &'static str = "while read line; do [ \"$line\" = stop ] && exit 0; done";

    /// Process that dies shortly after starting
    pub const CRASHER: &'static str = "sleep 0.2; exit 7";

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
            cpu_percent: 5.0,
            memory_total: 1024,
            memory_used: 512,
            memory_percent: 50.0,
            ..SystemMetrics::default()
        }
    }
}
