//! A real agent on a loopback port and a controller wired to it

use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use agent::services::RpcServer;
use agent::traits::{MockLaunchBuilder, MockMetricsSource};
use agent::{Agent, AgentConfig};
use controller::{
    ConnectionRegistry, ControlService, Connector, HealthMonitor, HostRecord, MemoryStatusStore, StatusStore,
    TcpConnector,
};

use super::fixtures::TestFixtures;

pub struct LiveAgent {
    pub agent: Arc<Agent>,
    pub host: HostRecord,
    shutdown: CancellationToken,
    server: Option<JoinHandle<agent::AgentResult<()>>>,
    _work_dir: TempDir,
}

impl LiveAgent {
    pub async fn start() -> Self {
        Self::with_script(TestFixtures::CONSOLE).await
    }

    /// Agent whose servers all run `script`
    pub async fn with_script(script: &'static str) -> Self {
        let work_dir = TempDir::new().unwrap();
        let mut metrics = MockMetricsSource::new();
        metrics.expect_collect().returning(|| Ok(TestFixtures::metrics()));

        let config = AgentConfig {
            agent_id: TestFixtures::AGENT_ID.to_string(),
            work_dir: work_dir.path().to_path_buf(),
            max_servers: 2,
            stop_grace_secs: 2,
            kill_grace_secs: 1,
            restart_delay_secs: 0,
            ..AgentConfig::default()
        };
        let agent = Arc::new(Agent::with_launcher(
            config,
            Arc::new(MockLaunchBuilder::shell(script)),
            Arc::new(metrics),
        ));

        let shutdown = CancellationToken::new();
        let server = RpcServer::bind(Arc::clone(&agent), "127.0.0.1:0", shutdown.clone())
            .await
            .unwrap();
        let host = TestFixtures::host(server.local_addr().unwrap());

        Self {
            agent,
            host,
            shutdown,
            server: Some(tokio::spawn(server.serve())),
            _work_dir: work_dir,
        }
    }

    /// Stop serving and terminate every server process
    pub async fn kill(&mut self) {
        self.shutdown.cancel();
        self.agent.shutdown().await;
        if let Some(server) = self.server.take() {
            server.await.unwrap().unwrap();
        }
    }
}

pub struct ControlPlane {
    pub store: Arc<MemoryStatusStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub monitor: Arc<HealthMonitor>,
    pub control: ControlService,
}

impl ControlPlane {
    pub fn new(hosts: Vec<HostRecord>) -> Self {
        let store = Arc::new(MemoryStatusStore::with_hosts(hosts));
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::new(TcpConnector::new()) as Arc<dyn Connector>,
            Arc::clone(&store) as Arc<dyn StatusStore>,
            TestFixtures::policy(),
        ));
        Self {
            store,
            monitor: Arc::new(HealthMonitor::new(Arc::clone(&registry))),
            control: ControlService::new(Arc::clone(&registry)),
            registry,
        }
    }
}
