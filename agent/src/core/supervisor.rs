//! Process supervisor
//!
//! Owns every live server process on this host. Each child gets two output
//! capture tasks feeding a bounded [`LogBuffer`] and one exit watcher. The
//! exit watcher is the only place a handle is ever removed from the table,
//! so a process that exits on its own and a process that is stopped are
//! cleaned up by the same code path exactly once.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::log_buffer::{LogBuffer, LogFollower, DEFAULT_LOG_CAPACITY};
use crate::error::{AgentError, AgentResult};
use crate::traits::LaunchBuilder;
use shared::{node_debug, node_error, node_info, node_warn, unix_now, LogEntry, LogSource, NodeId, ServerConfig};

/// Console command that asks a server to save and exit
pub const STOP_COMMAND: &str = "stop";

/// Time a server gets to exit after the stop command
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(30);

/// Time a server gets to exit after SIGTERM before it is killed
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on waiting for the exit after a kill
const FORCE_KILL_WAIT: Duration = Duration::from_secs(5);

/// Time the capture tasks get to drain the pipes after the process exited
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTimeouts {
    pub grace: Duration,
    pub kill_grace: Duration,
}

impl Default for StopTimeouts {
    fn default() -> Self {
        Self {
            grace: DEFAULT_STOP_GRACE,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }
}

/// How a server process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitRecord {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub success: bool,
    /// Whether a stop had been requested before the process exited
    pub requested: bool,
    pub exited_at: u64,
    /// How long the process ran
    pub uptime: Duration,
}

/// Published once per process after its handle has been removed
#[derive(Debug, Clone)]
pub struct ExitEvent {
    pub server_id: String,
    pub pid: u32,
    pub record: ExitRecord,
}

/// Result of a successful spawn
#[derive(Debug, Clone)]
pub struct SpawnedProcess {
    pub pid: u32,
    pub work_dir: PathBuf,
    pub started_at: u64,
}

/// Live process state shared between the supervisor and the process tasks
pub struct ChildHandle {
    server_id: String,
    pid: u32,
    started_at: u64,
    launched: Instant,
    stdin: Mutex<Option<ChildStdin>>,
    logs: Arc<LogBuffer<LogEntry>>,
    /// Ends the output capture tasks
    cancel: CancellationToken,
    /// Asks the exit watcher to kill the process
    kill: CancellationToken,
    stop_requested: AtomicBool,
    exit: watch::Receiver<Option<ExitRecord>>,
}

impl ChildHandle {
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    pub fn logs(&self) -> &Arc<LogBuffer<LogEntry>> {
        &self.logs
    }

    /// Write one console line to the process stdin
    async fn send_line(&self, line: &str) -> io::Result<()> {
        let mut stdin = self.stdin.lock().await;
        let pipe = stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdin is closed"))?;

        let mut data = line.trim_end_matches(['\r', '\n']).to_string();
        data.push('\n');
        pipe.write_all(data.as_bytes()).await?;
        pipe.flush().await
    }

    /// Wait up to `limit` for the exit record
    async fn wait_exit(&self, limit: Duration) -> Option<ExitRecord> {
        let mut exit = self.exit.clone();
        let result = tokio::time::timeout(limit, exit.wait_for(|record| record.is_some()))
            .await
            .map(|waited| waited.map(|record| (*record).clone()));
        match result {
            Ok(Ok(record)) => record,
            // Watcher gone without publishing: nothing left to wait for
            Ok(Err(_)) => Some(ExitRecord {
                code: None,
                success: false,
                requested: true,
                exited_at: unix_now(),
                uptime: self.launched.elapsed(),
            }),
            Err(_) => None,
        }
    }

    #[cfg(unix)]
    fn terminate(&self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if self.pid == 0 {
            return;
        }
        if let Err(e) = kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
            node_debug!(NodeId::current(), "SIGTERM to {} (pid {}) failed: {}", self.server_id, self.pid, e);
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self) {
        self.kill.cancel();
    }
}

type HandleTable = Arc<Mutex<HashMap<String, Arc<ChildHandle>>>>;

/// Spawns, tracks and terminates server processes
pub struct ProcessSupervisor {
    work_dir: PathBuf,
    launcher: Arc<dyn LaunchBuilder>,
    env: Vec<(String, String)>,
    timeouts: StopTimeouts,
    log_capacity: usize,
    handles: HandleTable,
    exit_tx: mpsc::UnboundedSender<ExitEvent>,
    exit_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<ExitEvent>>>,
}

impl ProcessSupervisor {
    /// Create a supervisor that runs each server in `work_dir/<server_id>`
    pub fn new(work_dir: impl Into<PathBuf>, launcher: Arc<dyn LaunchBuilder>) -> Self {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        Self {
            work_dir: work_dir.into(),
            launcher,
            env: Vec::new(),
            timeouts: StopTimeouts::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            handles: Arc::new(Mutex::new(HashMap::new())),
            exit_tx,
            exit_rx: std::sync::Mutex::new(Some(exit_rx)),
        }
    }

    /// Configure stop timeouts (fluent API)
    pub fn with_timeouts(mut self, timeouts: StopTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Configure per-server log capacity (fluent API)
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// Extra environment for every spawned server (fluent API)
    pub fn with_env(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env = env.into_iter().collect();
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn timeouts(&self) -> StopTimeouts {
        self.timeouts
    }

    /// Take the exit event stream. Only the first caller gets it.
    pub fn take_exit_events(&self) -> Option<mpsc::UnboundedReceiver<ExitEvent>> {
        self.exit_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    async fn handle(&self, server_id: &str) -> AgentResult<Arc<ChildHandle>> {
        self.handles
            .lock()
            .await
            .get(server_id)
            .cloned()
            .ok_or_else(|| AgentError::not_found(server_id))
    }

    /// Launch a server process
    pub async fn spawn(&self, server_id: &str, config: &ServerConfig) -> AgentResult<SpawnedProcess> {
        validate_server_id(server_id)?;

        let mut handles = self.handles.lock().await;
        if handles.contains_key(server_id) {
            return Err(AgentError::DuplicateServer {
                server_id: server_id.to_string(),
            });
        }

        let server_dir = self.work_dir.join(server_id);
        tokio::fs::create_dir_all(&server_dir)
            .await
            .map_err(|e| AgentError::spawn_failed(server_id, format!("cannot create {}: {e}", server_dir.display())))?;

        let program = self.launcher.program();
        let mut cmd = Command::new(&program);
        cmd.args(self.launcher.args(config))
            .current_dir(&server_dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| AgentError::spawn_failed(server_id, format!("{program}: {e}")))?;

        let pid = child.id().unwrap_or(0);
        let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                let _ = child.start_kill();
                return Err(AgentError::spawn_failed(server_id, "child stdio was not captured"));
            }
        };

        let started_at = unix_now();
        let (exit_state, exit) = watch::channel(None);
        let handle = Arc::new(ChildHandle {
            server_id: server_id.to_string(),
            pid,
            started_at,
            launched: Instant::now(),
            stdin: Mutex::new(Some(stdin)),
            logs: Arc::new(LogBuffer::new(self.log_capacity)),
            cancel: CancellationToken::new(),
            kill: CancellationToken::new(),
            stop_requested: AtomicBool::new(false),
            exit,
        });

        let captures = vec![
            spawn_capture(stdout, LogSource::Stdout, Arc::clone(&handle)),
            spawn_capture(stderr, LogSource::Stderr, Arc::clone(&handle)),
        ];

        tokio::spawn(watch_exit(
            child,
            captures,
            Arc::clone(&handle),
            Arc::clone(&self.handles),
            exit_state,
            self.exit_tx.clone(),
        ));

        handles.insert(server_id.to_string(), handle);

        node_info!(
            NodeId::current(),
            "🚀 Spawned server {} (pid {}) in {}",
            server_id,
            pid,
            server_dir.display()
        );

        Ok(SpawnedProcess {
            pid,
            work_dir: server_dir,
            started_at,
        })
    }

    /// Stop a server: console stop command, then SIGTERM, then kill
    ///
    /// Returns once the process has exited and its handle is gone. A second
    /// caller for the same server just waits for the first one to finish.
    pub async fn stop(&self, server_id: &str) -> AgentResult<ExitRecord> {
        let handle = self.handle(server_id).await?;
        let budget = self.timeouts.grace + self.timeouts.kill_grace + FORCE_KILL_WAIT;

        if handle.stop_requested.swap(true, Ordering::SeqCst) {
            return handle.wait_exit(budget).await.ok_or_else(|| AgentError::StopTimeout {
                server_id: server_id.to_string(),
                waited: budget,
            });
        }

        node_info!(NodeId::current(), "🛑 Stopping server {} (pid {})", server_id, handle.pid);

        if let Err(e) = handle.send_line(STOP_COMMAND).await {
            node_warn!(NodeId::current(), "Could not send stop command to {}: {}", server_id, e);
        }
        if let Some(record) = handle.wait_exit(self.timeouts.grace).await {
            return Ok(record);
        }

        node_warn!(
            NodeId::current(),
            "Server {} still running after {:?}, sending SIGTERM",
            server_id,
            self.timeouts.grace
        );
        handle.terminate();
        if let Some(record) = handle.wait_exit(self.timeouts.kill_grace).await {
            return Ok(record);
        }

        node_warn!(NodeId::current(), "Server {} ignored SIGTERM, killing", server_id);
        handle.kill.cancel();
        handle.wait_exit(FORCE_KILL_WAIT).await.ok_or_else(|| AgentError::StopTimeout {
            server_id: server_id.to_string(),
            waited: budget,
        })
    }

    /// Write one line to a server console
    pub async fn send_command(&self, server_id: &str, command: &str) -> AgentResult<()> {
        let handle = self.handle(server_id).await?;
        handle
            .send_line(command)
            .await
            .map_err(|e| AgentError::CommandFailed {
                server_id: server_id.to_string(),
                reason: e.to_string(),
            })?;

        node_debug!(NodeId::current(), "Sent command to {}: {}", server_id, command);
        Ok(())
    }

    /// The last `lines` captured log entries of a server, oldest first
    pub async fn tail_logs(&self, server_id: &str, lines: usize) -> AgentResult<Vec<LogEntry>> {
        Ok(self.handle(server_id).await?.logs.tail(lines))
    }

    /// Follow a server's log buffer; ends when the process exits
    pub async fn follow_logs(&self, server_id: &str) -> AgentResult<LogFollower<LogEntry>> {
        Ok(self.handle(server_id).await?.logs.follow())
    }

    pub async fn is_running(&self, server_id: &str) -> bool {
        self.handles.lock().await.contains_key(server_id)
    }

    /// Ids and pids of all live processes
    pub async fn running(&self) -> Vec<(String, u32)> {
        self.handles
            .lock()
            .await
            .values()
            .map(|h| (h.server_id.clone(), h.pid))
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.handles.lock().await.len()
    }

    /// Stop every live process concurrently, returning how many exited
    pub async fn stop_all(&self) -> usize {
        let ids: Vec<String> = self.handles.lock().await.keys().cloned().collect();
        if ids.is_empty() {
            return 0;
        }

        node_info!(NodeId::current(), "🛑 Stopping {} server(s)", ids.len());
        let results = join_all(ids.iter().map(|id| self.stop(id))).await;

        let mut stopped = 0;
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(_) => stopped += 1,
                Err(AgentError::ServerNotFound { .. }) => stopped += 1,
                Err(e) => node_error!(NodeId::current(), "Failed to stop {}: {}", id, e),
            }
        }
        stopped
    }
}

/// Ids become directory names, so they must be a single plain path component
pub fn validate_server_id(server_id: &str) -> AgentResult<()> {
    let valid = !server_id.is_empty()
        && server_id != "."
        && server_id != ".."
        && server_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(AgentError::InvalidServerId {
            server_id: server_id.to_string(),
        })
    }
}

fn spawn_capture<R>(reader: R, source: LogSource, handle: Arc<ChildHandle>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            tokio::select! {
                _ = handle.cancel.cancelled() => break,
                line = lines.next_line() => match line {
                    Ok(Some(message)) => handle.logs.push(LogEntry {
                        timestamp: unix_now(),
                        server_id: handle.server_id.clone(),
                        source,
                        message,
                    }),
                    Ok(None) => break,
                    Err(e) => {
                        node_debug!(NodeId::current(), "{} capture for {} ended: {}", source, handle.server_id, e);
                        break;
                    }
                }
            }
        }
    })
}

async fn watch_exit(
    mut child: Child,
    captures: Vec<JoinHandle<()>>,
    handle: Arc<ChildHandle>,
    handles: HandleTable,
    exit_state: watch::Sender<Option<ExitRecord>>,
    exit_tx: mpsc::UnboundedSender<ExitEvent>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = handle.kill.cancelled() => {
            if let Err(e) = child.start_kill() {
                node_warn!(NodeId::current(), "Kill of {} (pid {}) failed: {}", handle.server_id, handle.pid, e);
            }
            child.wait().await
        }
    };

    let (code, success) = match &status {
        Ok(status) => (status.code(), status.success()),
        Err(e) => {
            node_error!(NodeId::current(), "Waiting on {} failed: {}", handle.server_id, e);
            (None, false)
        }
    };

    if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, join_all(captures)).await.is_err() {
        node_debug!(NodeId::current(), "Output of {} still open after exit, detaching", handle.server_id);
    }
    handle.cancel.cancel();
    handle.logs.close();
    handle.stdin.lock().await.take();

    let record = ExitRecord {
        code,
        success,
        requested: handle.stop_requested.load(Ordering::SeqCst),
        exited_at: unix_now(),
        uptime: handle.launched.elapsed(),
    };

    {
        let mut table = handles.lock().await;
        let is_current = table
            .get(&handle.server_id)
            .is_some_and(|current| Arc::ptr_eq(current, &handle));
        if is_current {
            table.remove(&handle.server_id);
        }
    }

    if record.requested {
        node_info!(NodeId::current(), "Server {} exited (code {:?})", handle.server_id, record.code);
    } else {
        node_warn!(
            NodeId::current(),
            "⚠️ Server {} exited unexpectedly (code {:?})",
            handle.server_id,
            record.code
        );
    }

    exit_state.send_replace(Some(record.clone()));
    let _ = exit_tx.send(ExitEvent {
        server_id: handle.server_id.clone(),
        pid: handle.pid,
        record,
    });
}
