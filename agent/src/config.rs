//! Agent configuration
//!
//! Loaded from a JSON file. Every field has a default, so a partial file (or
//! no file at all) yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::log_buffer::DEFAULT_LOG_CAPACITY;
use crate::core::registry::{RestartPolicy, DEFAULT_MAX_SERVERS, DEFAULT_RESTART_DELAY, DEFAULT_STABLE_RUN};
use crate::core::supervisor::{StopTimeouts, DEFAULT_KILL_GRACE, DEFAULT_STOP_GRACE};
use crate::error::{AgentError, AgentResult};

pub const DEFAULT_PORT: u16 = 50051;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub agent_id: String,
    pub bind_address: String,
    pub port: u16,
    pub log_level: String,
    pub max_servers: usize,
    pub java_path: String,
    /// Each server runs in `work_dir/<server_id>`
    pub work_dir: PathBuf,
    pub enable_metrics: bool,
    pub metrics_interval_secs: u64,
    pub stop_grace_secs: u64,
    pub kill_grace_secs: u64,
    pub restart_delay_secs: u64,
    /// A crash after running this long no longer counts toward the auto-restart limit
    pub stable_run_secs: u64,
    pub log_buffer_capacity: usize,
    /// Extra environment for every server process
    pub custom_env: BTreeMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: default_agent_id(),
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            log_level: "info".to_string(),
            max_servers: DEFAULT_MAX_SERVERS,
            java_path: "/usr/bin/java".to_string(),
            work_dir: PathBuf::from("/var/aymc/servers"),
            enable_metrics: true,
            metrics_interval_secs: 5,
            stop_grace_secs: DEFAULT_STOP_GRACE.as_secs(),
            kill_grace_secs: DEFAULT_KILL_GRACE.as_secs(),
            restart_delay_secs: DEFAULT_RESTART_DELAY.as_secs(),
            stable_run_secs: DEFAULT_STABLE_RUN.as_secs(),
            log_buffer_capacity: DEFAULT_LOG_CAPACITY,
            custom_env: BTreeMap::new(),
        }
    }
}

impl AgentConfig {
    /// Read and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> AgentResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| AgentError::config(format!("cannot read {}: {e}", path.display())))?;
        let config: AgentConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AgentResult<()> {
        if self.agent_id.trim().is_empty() {
            return Err(AgentError::config("agent_id must not be empty"));
        }
        if self.max_servers == 0 {
            return Err(AgentError::config("max_servers must be at least 1"));
        }
        if self.java_path.trim().is_empty() {
            return Err(AgentError::config("java_path must not be empty"));
        }
        if self.enable_metrics && self.metrics_interval_secs == 0 {
            return Err(AgentError::config("metrics_interval_secs must be at least 1"));
        }
        Ok(())
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn stop_timeouts(&self) -> StopTimeouts {
        StopTimeouts {
            grace: Duration::from_secs(self.stop_grace_secs),
            kill_grace: Duration::from_secs(self.kill_grace_secs),
        }
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy {
            delay: Duration::from_secs(self.restart_delay_secs),
            stable_run: Duration::from_secs(self.stable_run_secs),
        }
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }
}

fn default_agent_id() -> String {
    format!("agent-{}", chrono::Utc::now().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.port, 50051);
        assert_eq!(config.max_servers, 10);
        assert_eq!(config.work_dir, PathBuf::from("/var/aymc/servers"));
        assert_eq!(config.stop_timeouts().grace, Duration::from_secs(30));
        assert!(config.agent_id.starts_with("agent-"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"agent_id": "eu-1", "max_servers": 3, "custom_env": {{"TZ": "UTC"}}}}"#
        )
        .unwrap();

        let config = AgentConfig::load(file.path()).unwrap();

        assert_eq!(config.agent_id, "eu-1");
        assert_eq!(config.max_servers, 3);
        assert_eq!(config.custom_env.get("TZ").map(String::as_str), Some("UTC"));
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_servers": 0}}"#).unwrap();
        assert!(matches!(
            AgentConfig::load(file.path()),
            Err(AgentError::ConfigurationError { .. })
        ));

        assert!(AgentConfig::load("/nonexistent/agent.json").is_err());
    }
}
