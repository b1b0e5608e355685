//! Server registry
//!
//! Tracks the descriptor of every server this host runs and enforces the
//! admission rules (unique ids, host capacity) on top of the supervisor.
//! Lock order is always registry table first, supervisor table second.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::core::log_buffer::LogFollower;
use crate::core::supervisor::{ExitEvent, ProcessSupervisor};
use crate::error::{AgentError, AgentResult};
use shared::{
    node_error, node_info, node_warn, LogEntry, NodeId, ServerDescriptor, ServerStatus, StartServerRequest,
};

/// Default maximum number of concurrent servers per host
pub const DEFAULT_MAX_SERVERS: usize = 10;

/// Pause between the stop and start halves of a restart
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(2);

/// Automatic restarts allowed after consecutive crashes
pub const MAX_AUTO_RESTARTS: u32 = 3;

/// A process that ran at least this long before crashing starts a new crash streak
pub const DEFAULT_STABLE_RUN: Duration = Duration::from_secs(60);

/// Timing of restarts, both requested and automatic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub delay: Duration,
    pub stable_run: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RESTART_DELAY,
            stable_run: DEFAULT_STABLE_RUN,
        }
    }
}

struct RegistryInner {
    agent_id: String,
    max_servers: usize,
    restart: RestartPolicy,
    supervisor: Arc<ProcessSupervisor>,
    /// Servers with a live process, or a crashed one waiting to be respawned
    servers: Mutex<HashMap<String, ServerDescriptor>>,
    /// Last known descriptor of servers that are no longer live
    retired: Mutex<HashMap<String, ServerDescriptor>>,
    shutting_down: AtomicBool,
}

/// Descriptor table and admission control for the servers of one host
pub struct ServerRegistry {
    inner: Arc<RegistryInner>,
    exit_listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ServerRegistry {
    /// Create the registry and start listening for process exits
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(agent_id: impl Into<String>, max_servers: usize, supervisor: Arc<ProcessSupervisor>) -> Self {
        Self::with_restart_policy(agent_id, max_servers, supervisor, RestartPolicy::default())
    }

    pub fn with_restart_policy(
        agent_id: impl Into<String>,
        max_servers: usize,
        supervisor: Arc<ProcessSupervisor>,
        restart: RestartPolicy,
    ) -> Self {
        let exits = supervisor.take_exit_events();
        let inner = Arc::new(RegistryInner {
            agent_id: agent_id.into(),
            max_servers,
            restart,
            supervisor,
            servers: Mutex::new(HashMap::new()),
            retired: Mutex::new(HashMap::new()),
            shutting_down: AtomicBool::new(false),
        });

        let exit_listener = match exits {
            Some(exits) => Some(tokio::spawn(listen_for_exits(Arc::clone(&inner), exits))),
            None => {
                node_warn!(NodeId::current(), "Exit events already taken, crashes will not be tracked");
                None
            }
        };

        Self {
            inner,
            exit_listener: std::sync::Mutex::new(exit_listener),
        }
    }

    pub fn max_servers(&self) -> usize {
        self.inner.max_servers
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.inner.supervisor
    }

    /// Admit and launch a new server
    pub async fn start(&self, request: StartServerRequest) -> AgentResult<ServerDescriptor> {
        let inner = &self.inner;
        let mut servers = inner.servers.lock().await;

        if servers.contains_key(&request.server_id) {
            return Err(AgentError::DuplicateServer {
                server_id: request.server_id,
            });
        }
        if servers.len() >= inner.max_servers {
            return Err(AgentError::CapacityExceeded {
                max_servers: inner.max_servers,
            });
        }

        let mut descriptor = ServerDescriptor::from_request(request, inner.agent_id.clone());
        let spawned = inner.supervisor.spawn(&descriptor.id, &descriptor.config).await?;

        descriptor.status = ServerStatus::Running;
        descriptor.pid = Some(spawned.pid);
        descriptor.started_at = Some(spawned.started_at);
        descriptor.work_dir = spawned.work_dir;

        servers.insert(descriptor.id.clone(), descriptor.clone());
        inner.retired.lock().await.remove(&descriptor.id);

        node_info!(
            NodeId::current(),
            "✅ Server {} ({} {}) started on port {}",
            descriptor.id,
            descriptor.server_type,
            descriptor.version,
            descriptor.port
        );
        Ok(descriptor)
    }

    /// Stop a server and forget it
    pub async fn stop(&self, server_id: &str) -> AgentResult<ServerDescriptor> {
        let inner = &self.inner;
        {
            let mut servers = inner.servers.lock().await;
            let descriptor = servers.get_mut(server_id).ok_or_else(|| AgentError::not_found(server_id))?;
            if descriptor.status == ServerStatus::Stopping {
                return Err(AgentError::StopInProgress {
                    server_id: server_id.to_string(),
                });
            }
            descriptor.status = ServerStatus::Stopping;
        }

        let result = inner.supervisor.stop(server_id).await;

        let mut servers = inner.servers.lock().await;
        match result {
            // Already gone: it exited while we were asking it to
            Ok(_) | Err(AgentError::ServerNotFound { .. }) => {
                let mut descriptor = servers.remove(server_id).ok_or_else(|| AgentError::not_found(server_id))?;
                descriptor.status = ServerStatus::Stopped;
                descriptor.pid = None;
                inner.retired.lock().await.insert(descriptor.id.clone(), descriptor.clone());
                node_info!(NodeId::current(), "Server {} stopped", server_id);
                Ok(descriptor)
            }
            Err(e) => {
                if let Some(descriptor) = servers.get_mut(server_id) {
                    descriptor.status = ServerStatus::Running;
                }
                Err(e)
            }
        }
    }

    /// Stop, wait, then start again with the same request
    pub async fn restart(&self, server_id: &str) -> AgentResult<ServerDescriptor> {
        let request = self.get(server_id).await?.to_request();
        self.stop(server_id).await?;
        tokio::time::sleep(self.inner.restart.delay).await;
        self.start(request).await
    }

    /// Descriptor of a live server, or the last known one of a retired server
    pub async fn get(&self, server_id: &str) -> AgentResult<ServerDescriptor> {
        if let Some(descriptor) = self.inner.servers.lock().await.get(server_id) {
            return Ok(descriptor.clone());
        }
        self.inner
            .retired
            .lock()
            .await
            .get(server_id)
            .cloned()
            .ok_or_else(|| AgentError::not_found(server_id))
    }

    /// All live servers, sorted by id
    pub async fn list(&self) -> Vec<ServerDescriptor> {
        let mut servers: Vec<_> = self.inner.servers.lock().await.values().cloned().collect();
        servers.sort_by(|a, b| a.id.cmp(&b.id));
        servers
    }

    pub async fn count(&self) -> usize {
        self.inner.servers.lock().await.len()
    }

    pub async fn send_command(&self, server_id: &str, command: &str) -> AgentResult<()> {
        self.inner.supervisor.send_command(server_id, command).await
    }

    pub async fn tail_logs(&self, server_id: &str, lines: usize) -> AgentResult<Vec<LogEntry>> {
        self.inner.supervisor.tail_logs(server_id, lines).await
    }

    pub async fn follow_logs(&self, server_id: &str) -> AgentResult<LogFollower<LogEntry>> {
        self.inner.supervisor.follow_logs(server_id).await
    }

    /// Stop everything and stop tracking exits
    pub async fn shutdown(&self) -> usize {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        let stopped = self.inner.supervisor.stop_all().await;

        let mut servers = self.inner.servers.lock().await;
        let mut retired = self.inner.retired.lock().await;
        for (id, mut descriptor) in servers.drain() {
            descriptor.status = ServerStatus::Stopped;
            descriptor.pid = None;
            retired.insert(id, descriptor);
        }

        let listener = self
            .exit_listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(listener) = listener {
            listener.abort();
        }
        stopped
    }
}

async fn listen_for_exits(inner: Arc<RegistryInner>, mut exits: mpsc::UnboundedReceiver<ExitEvent>) {
    while let Some(event) = exits.recv().await {
        handle_exit(&inner, event).await;
    }
}

async fn handle_exit(inner: &Arc<RegistryInner>, event: ExitEvent) {
    // A requested stop is finished by `ServerRegistry::stop`
    if event.record.requested {
        return;
    }

    let mut servers = inner.servers.lock().await;
    let Some(descriptor) = servers.get_mut(&event.server_id) else {
        return;
    };
    // Stale event, or a stop raced the exit and will finish the job
    if descriptor.pid != Some(event.pid) || descriptor.status == ServerStatus::Stopping {
        return;
    }

    descriptor.pid = None;
    if event.record.success || event.record.uptime >= inner.restart.stable_run {
        descriptor.restart_count = 0;
    }

    if event.record.success {
        descriptor.status = ServerStatus::Stopped;
    } else {
        descriptor.status = ServerStatus::Crashed;
        let can_restart = descriptor.config.auto_restart
            && descriptor.restart_count < MAX_AUTO_RESTARTS
            && !inner.shutting_down.load(Ordering::SeqCst);

        if can_restart {
            node_warn!(
                NodeId::current(),
                "Server {} crashed (code {:?}), restarting ({}/{})",
                event.server_id,
                event.record.code,
                descriptor.restart_count + 1,
                MAX_AUTO_RESTARTS
            );
            // The crashed descriptor keeps its slot until the respawn decides
            tokio::spawn(respawn_after_delay(Arc::clone(inner), event.server_id.clone()));
            return;
        }

        node_error!(
            NodeId::current(),
            "❌ Server {} crashed (code {:?})",
            event.server_id,
            event.record.code
        );
    }

    if let Some(descriptor) = servers.remove(&event.server_id) {
        inner.retired.lock().await.insert(descriptor.id.clone(), descriptor);
    }
}

async fn respawn_after_delay(inner: Arc<RegistryInner>, server_id: String) {
    tokio::time::sleep(inner.restart.delay).await;

    let mut servers = inner.servers.lock().await;
    let Some(descriptor) = servers.get_mut(&server_id) else {
        return;
    };
    // Stopped or replaced while we were waiting
    if descriptor.status != ServerStatus::Crashed || inner.shutting_down.load(Ordering::SeqCst) {
        return;
    }

    match inner.supervisor.spawn(&server_id, &descriptor.config).await {
        Ok(spawned) => {
            descriptor.status = ServerStatus::Running;
            descriptor.pid = Some(spawned.pid);
            descriptor.started_at = Some(spawned.started_at);
            descriptor.restart_count += 1;
            node_info!(NodeId::current(), "Server {} restarted (pid {})", server_id, spawned.pid);
        }
        Err(e) => {
            node_error!(NodeId::current(), "❌ Automatic restart of {} failed: {}", server_id, e);
            if let Some(descriptor) = servers.remove(&server_id) {
                inner.retired.lock().await.insert(server_id, descriptor);
            }
        }
    }
}
