//! Service-level tests
//!
//! Request dispatch and the TCP server are exercised against real `sh`
//! processes with a mocked metrics source.


// Common test utilities for services
#[cfg(all(test, unix))]
pub mod common {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::agent::Agent;
    use crate::config::AgentConfig;
    use crate::traits::{MockLaunchBuilder, MockMetricsSource};
    use shared::{ServerConfig, StartServerRequest, SystemMetrics};

    /// Standard timeout for async operations in tests
    pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Console that echoes lines and exits on `stop`
    pub const CONSOLE: &str = r#"echo ready
while read line; do
  if [ "$line" = "stop" ]; then echo bye; exit 0; fi
  echo "got $line"
done"#;

    pub fn sample_metrics() -> SystemMetrics {
        SystemMetrics {
            timestamp: 1_700_000_000,
            cpu_percent: 12.5,
            memory_total: 16 * 1024 * 1024 * 1024,
            memory_used: 4 * 1024 * 1024 * 1024,
            memory_percent: 25.0,
            process_count: 42,
            ..SystemMetrics::default()
        }
    }

    /// Agent rooted in `work_dir` that runs `script` for every server
    pub fn test_agent(work_dir: &std::path::Path, script: &'static str, max_servers: usize) -> Agent {
        let mut metrics = MockMetricsSource::new();
        metrics.expect_collect().returning(|| Ok(sample_metrics()));

        let config = AgentConfig {
            agent_id: "test-host".to_string(),
            work_dir: work_dir.to_path_buf(),
            max_servers,
            stop_grace_secs: 1,
            kill_grace_secs: 1,
            restart_delay_secs: 0,
            ..AgentConfig::default()
        };
        Agent::with_launcher(config, Arc::new(MockLaunchBuilder::shell(script)), Arc::new(metrics))
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
}
