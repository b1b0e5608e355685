//! Periodic health checks over all registered hosts
//!
//! Every tick probes all connections concurrently and waits for the whole
//! pass before sleeping again. A host whose consecutive failures reach the
//! threshold goes offline; a later successful probe brings it back.
//! Connections without a channel are redialed instead of pinged.

use chrono::Utc;
use futures_util::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::connection::RemoteConnection;
use super::registry::ConnectionRegistry;
use crate::error::{ControllerError, ControllerResult};
use shared::{node_debug, node_error, node_info, node_warn, HostId, HostStatus, NodeId};

/// What one health check did to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Probe succeeded on an online host
    Healthy,
    /// Probe succeeded on a host that was not online
    Recovered,
    /// Probe failed, still under the threshold (or already offline)
    Failed { failures: u32 },
    /// Probe failed and the threshold was reached
    WentOffline,
    /// Host without a channel was dialed successfully
    Reconnected,
    /// Host without a channel could not be dialed
    ReconnectFailed,
    /// A dial is already in flight
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub connecting: usize,
    pub error: usize,
    pub healthy: usize,
    /// Completed check passes since creation
    pub passes: u64,
}

pub struct HealthMonitor {
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    failure_threshold: u32,
    passes: AtomicU64,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    /// Monitor using the registry's check interval and failure threshold
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        let policy = *registry.policy();
        Self {
            registry,
            interval: policy.check_interval,
            failure_threshold: policy.failure_threshold,
            passes: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one check pass now, then keep checking every interval
    ///
    /// Calling it again while running is a no-op. A stopped monitor cannot
    /// be restarted.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.is_some() || self.cancel.is_cancelled() {
            node_warn!(NodeId::current(), "Health monitor already started");
            return;
        }

        node_info!(
            NodeId::current(),
            "Health monitor starting (interval {:?}, threshold {})",
            self.interval,
            self.failure_threshold
        );
        self.check_all().await;

        let monitor = Arc::clone(self);
        let cancel = self.cancel.clone();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + monitor.interval, monitor.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        monitor.check_all().await;
                    }
                }
            }
            node_debug!(NodeId::current(), "Health monitor loop exited");
        }));
    }

    /// Cancel the loop and wait for it to finish
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                node_error!(NodeId::current(), "Health monitor task failed: {}", e);
            }
            node_info!(NodeId::current(), "Health monitor stopped");
        }
    }

    /// Check every registered host concurrently, one task per host
    pub async fn check_all(&self) -> Vec<(HostId, CheckOutcome)> {
        let connections = self.registry.list().await;
        let handles: Vec<_> = connections
            .into_iter()
            .map(|connection| {
                let registry = Arc::clone(&self.registry);
                let threshold = self.failure_threshold;
                tokio::spawn(async move {
                    let outcome = check_connection(&registry, &connection, threshold).await;
                    (connection.id(), outcome)
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for result in join_all(handles).await {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => node_error!(NodeId::current(), "Health check task failed: {}", e),
            }
        }
        self.passes.fetch_add(1, Ordering::Relaxed);
        outcomes
    }

    /// Check a single host right away
    pub async fn check_host(&self, host_id: HostId) -> ControllerResult<CheckOutcome> {
        let connection = self
            .registry
            .get(host_id)
            .await
            .ok_or(ControllerError::HostNotFound { host_id })?;
        Ok(check_connection(&self.registry, &connection, self.failure_threshold).await)
    }

    pub async fn stats(&self) -> MonitorStats {
        let mut stats = MonitorStats {
            passes: self.passes.load(Ordering::Relaxed),
            ..MonitorStats::default()
        };
        for connection in self.registry.list().await {
            stats.total += 1;
            match connection.status().await {
                HostStatus::Online => stats.online += 1,
                HostStatus::Offline => stats.offline += 1,
                HostStatus::Connecting => stats.connecting += 1,
                HostStatus::Error => stats.error += 1,
            }
            if connection.is_healthy().await {
                stats.healthy += 1;
            }
        }
        stats
    }
}

async fn check_connection(
    registry: &ConnectionRegistry,
    connection: &RemoteConnection,
    failure_threshold: u32,
) -> CheckOutcome {
    let host_id = connection.id();
    let hostname = &connection.host().hostname;
    let before = connection.status().await;

    if before == HostStatus::Connecting {
        return CheckOutcome::Skipped;
    }
    if before == HostStatus::Error || !connection.is_connected().await {
        return reconnect(registry, connection).await;
    }

    match connection.probe().await {
        Ok(round_trip) => {
            node_debug!(NodeId::current(), "Host {} answered in {:?}", hostname, round_trip);
            if let Err(e) = connection.update_metrics().await {
                node_debug!(NodeId::current(), "Metrics from {} unavailable: {}", hostname, e);
            }
            if let Err(e) = connection.refresh_info().await {
                node_debug!(NodeId::current(), "Agent info from {} unavailable: {}", hostname, e);
            }
            registry.update_last_seen(host_id, Utc::now()).await;

            if before == HostStatus::Online {
                CheckOutcome::Healthy
            } else {
                node_info!(NodeId::current(), "Host {} recovered", hostname);
                registry.update_status(host_id, HostStatus::Online).await;
                CheckOutcome::Recovered
            }
        }
        Err(e) => {
            let failures = connection.consecutive_failures().await;
            if failures < failure_threshold || connection.status().await == HostStatus::Offline {
                node_debug!(NodeId::current(), "Host {} failed check {}: {}", hostname, failures, e);
                return CheckOutcome::Failed { failures };
            }

            connection.mark_offline().await;
            registry.update_status(host_id, HostStatus::Offline).await;
            node_warn!(
                NodeId::current(),
                "Host {} marked offline after {} failed checks: {}",
                hostname,
                failures,
                e
            );

            let running = connection.metrics().await.active_servers;
            if running > 0 {
                node_warn!(
                    NodeId::current(),
                    "Host {} went offline with {} servers; failover is not implemented",
                    hostname,
                    running
                );
            }
            CheckOutcome::WentOffline
        }
    }
}

async fn reconnect(registry: &ConnectionRegistry, connection: &RemoteConnection) -> CheckOutcome {
    let hostname = &connection.host().hostname;
    if !connection
        .try_claim_dial(&[HostStatus::Error, HostStatus::Offline])
        .await
    {
        return CheckOutcome::Skipped;
    }

    match connection.finish_connect().await {
        Ok(()) => {
            node_info!(NodeId::current(), "Reconnected to host {}", hostname);
            registry.update_status(connection.id(), HostStatus::Online).await;
            registry.update_last_seen(connection.id(), Utc::now()).await;
            CheckOutcome::Reconnected
        }
        Err(e) => {
            node_debug!(NodeId::current(), "Reconnect to host {} failed: {}", hostname, e);
            CheckOutcome::ReconnectFailed
        }
    }
}
