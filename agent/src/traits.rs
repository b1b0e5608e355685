//! Trait seams of the host agent
//!
//! The supervisor never hard-codes how a server is launched and the agent
//! never hard-codes where host metrics come from. Both are injected so tests
//! can run a plain shell instead of a JVM and a fixed metrics snapshot
//! instead of the real machine.

use crate::error::AgentResult;
use shared::{ServerConfig, SystemMetrics};

/// Builds the program and argument list used to launch one server
#[mockall::automock]
pub trait LaunchBuilder: Send + Sync {
    /// Executable to run
    fn program(&self) -> String;

    /// Full argument list for a server with the given configuration
    fn args(&self, config: &ServerConfig) -> Vec<String>;
}

impl MockLaunchBuilder {
    /// Launcher that runs `sh -c <script>` whatever the server config
    pub fn shell(script: &str) -> Self {
        let script = script.to_string();
        let mut launcher = Self::new();
        launcher.expect_program().returning(|| "sh".to_string());
        launcher
            .expect_args()
            .returning(move |_| vec!["-c".to_string(), script.clone()]);
        launcher
    }
}

/// Source of host-wide resource metrics
#[mockall::automock]
#[async_trait::async_trait]
pub trait MetricsSource: Send + Sync {
    /// Take one snapshot of CPU, memory, disk and network usage
    async fn collect(&self) -> AgentResult<SystemMetrics>;
}
