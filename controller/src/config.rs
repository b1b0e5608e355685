//! Controller configuration
//!
//! JSON file with defaults for every field; the command line can override
//! the hosts file, the log level and the check interval.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::connection::{
    ConnectionPolicy, DEFAULT_CHECK_INTERVAL, DEFAULT_DIAL_TIMEOUT, DEFAULT_FAILURE_THRESHOLD,
    DEFAULT_OPERATION_TIMEOUT, DEFAULT_PROBE_TIMEOUT,
};
use crate::error::{ControllerError, ControllerResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// JSON array of host records seeding the status store
    pub hosts_file: Option<PathBuf>,
    pub log_level: String,
    pub check_interval_secs: u64,
    pub failure_threshold: u32,
    pub probe_timeout_secs: u64,
    pub dial_timeout_secs: u64,
    pub operation_timeout_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            hosts_file: None,
            log_level: "info".to_string(),
            check_interval_secs: DEFAULT_CHECK_INTERVAL.as_secs(),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT.as_secs(),
            dial_timeout_secs: DEFAULT_DIAL_TIMEOUT.as_secs(),
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT.as_secs(),
        }
    }
}

impl ControllerConfig {
    pub fn load(path: impl AsRef<Path>) -> ControllerResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| ControllerError::config(format!("cannot read {}: {e}", path.display())))?;
        let config: ControllerConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ControllerResult<()> {
        if self.check_interval_secs == 0 {
            return Err(ControllerError::config("check_interval_secs must be at least 1"));
        }
        if self.failure_threshold == 0 {
            return Err(ControllerError::config("failure_threshold must be at least 1"));
        }
        if self.probe_timeout_secs == 0 || self.dial_timeout_secs == 0 || self.operation_timeout_secs == 0 {
            return Err(ControllerError::config("timeouts must be at least 1 second"));
        }
        Ok(())
    }

    pub fn policy(&self) -> ConnectionPolicy {
        ConnectionPolicy {
            dial_timeout: Duration::from_secs(self.dial_timeout_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            operation_timeout: Duration::from_secs(self.operation_timeout_secs),
            check_interval: Duration::from_secs(self.check_interval_secs),
            failure_threshold: self.failure_threshold,
        }
    }
}
