//! Builder for agents backed by shell processes

use std::path::Path;
use std::sync::Arc;

use agent::traits::{MockLaunchBuilder, MockMetricsSource};
use agent::{Agent, AgentConfig};

use super::fixtures::TestFixtures;

pub struct AgentBuilder {
    config: AgentConfig,
    script: &'static str,
}

impl AgentBuilder {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            config: AgentConfig {
                agent_id: TestFixtures::AGENT_ID.to_string(),
                work_dir: work_dir.to_path_buf(),
                stop_grace_secs: 1,
                kill_grace_secs: 1,
                restart_delay_secs: 0,
                ..AgentConfig::default()
            },
            script: TestFixtures::CONSOLE,
        }
    }

    pub fn with_max_servers(mut self, max_servers: usize) -> Self {
        self.config.max_servers = max_servers;
        self
    }

    pub fn with_script(mut self, script: &'static str) -> Self {
        self.script = script;
        self
    }

    pub fn build(self) -> Arc<Agent> {
        let mut metrics = MockMetricsSource::new();
        metrics.expect_collect().returning(|| Ok(TestFixtures::metrics()));
        Arc::new(Agent::with_launcher(
            self.config,
            Arc::new(MockLaunchBuilder::shell(self.script)),
            Arc::new(metrics),
        ))
    }
}
