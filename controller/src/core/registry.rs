//! Registry of host connections
//!
//! One read/write lock guards the id to connection map. Dialing always
//! happens outside that lock, so a slow host never blocks lookups.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::connection::{ConnectionPolicy, RemoteConnection};
use crate::error::{ControllerError, ControllerResult};
use crate::traits::{Connector, HostRecord, StatusStore};
use shared::{node_debug, node_info, node_warn, HostId, HostStatus, NodeId};

pub struct ConnectionRegistry {
    connections: RwLock<HashMap<HostId, Arc<RemoteConnection>>>,
    connector: Arc<dyn Connector>,
    store: Arc<dyn StatusStore>,
    policy: ConnectionPolicy,
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn Connector>, store: Arc<dyn StatusStore>, policy: ConnectionPolicy) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connector,
            store,
            policy,
        }
    }

    pub fn policy(&self) -> &ConnectionPolicy {
        &self.policy
    }

    /// Add a host and connect to it
    ///
    /// Idempotent: a host that is already online (or being dialed) is
    /// returned as is. A failed dial leaves the host registered in `Error`
    /// so the health monitor keeps retrying it.
    pub async fn register(&self, host: HostRecord) -> ControllerResult<Arc<RemoteConnection>> {
        let connection = {
            let mut connections = self.connections.write().await;
            let entry = connections.entry(host.id).or_insert_with(|| {
                Arc::new(RemoteConnection::new(
                    host.clone(),
                    Arc::clone(&self.connector),
                    self.policy,
                ))
            });
            Arc::clone(entry)
        };

        if !connection
            .try_claim_dial(&[HostStatus::Offline, HostStatus::Error])
            .await
        {
            node_debug!(NodeId::current(), "Host {} already connected", host.hostname);
            return Ok(connection);
        }

        match connection.finish_connect().await {
            Ok(()) => {
                node_info!(
                    NodeId::current(),
                    "Connected to host {} ({})",
                    host.hostname,
                    host.address()
                );
                self.update_status(host.id, HostStatus::Online).await;
                self.update_last_seen(host.id, Utc::now()).await;
                Ok(connection)
            }
            Err(e) => {
                node_warn!(NodeId::current(), "Failed to connect to host {}: {}", host.hostname, e);
                self.update_status(host.id, HostStatus::Error).await;
                Err(e)
            }
        }
    }

    /// Disconnect and forget a host
    pub async fn unregister(&self, host_id: HostId) -> ControllerResult<()> {
        let connection = self
            .connections
            .write()
            .await
            .remove(&host_id)
            .ok_or(ControllerError::HostNotFound { host_id })?;

        connection.disconnect().await;
        self.update_status(host_id, HostStatus::Offline).await;
        node_info!(NodeId::current(), "Unregistered host {}", connection.host().hostname);
        Ok(())
    }

    pub async fn get(&self, host_id: HostId) -> Option<Arc<RemoteConnection>> {
        self.connections.read().await.get(&host_id).cloned()
    }

    /// Point-in-time copy of all connections
    pub async fn list(&self) -> Vec<Arc<RemoteConnection>> {
        self.connections.read().await.values().cloned().collect()
    }

    pub async fn healthy(&self) -> Vec<Arc<RemoteConnection>> {
        let mut healthy = Vec::new();
        for connection in self.list().await {
            if connection.is_healthy().await {
                healthy.push(connection);
            }
        }
        healthy
    }

    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn count_online(&self) -> usize {
        let mut online = 0;
        for connection in self.list().await {
            if connection.status().await == HostStatus::Online {
                online += 1;
            }
        }
        online
    }

    /// Register every stored host that was online or has never been seen
    ///
    /// Hosts that fail to connect are logged and stay registered in `Error`.
    /// Returns how many hosts connected.
    pub async fn load_from_store(&self) -> ControllerResult<usize> {
        let hosts = self.store.load_hosts().await?;
        let candidates: Vec<_> = hosts
            .into_iter()
            .filter(|h| h.status == HostStatus::Online || h.last_seen.is_none())
            .collect();
        node_info!(NodeId::current(), "Loading {} hosts from the status store", candidates.len());

        let results = join_all(candidates.into_iter().map(|host| self.register(host))).await;
        Ok(results.iter().filter(|r| r.is_ok()).count())
    }

    /// Disconnect every host and empty the registry
    pub async fn shutdown(&self) {
        let connections: Vec<_> = self.connections.write().await.drain().map(|(_, c)| c).collect();
        join_all(connections.iter().map(|c| c.disconnect())).await;
        node_info!(NodeId::current(), "Closed {} host connections", connections.len());
    }

    /// Mirror a status change into the store, logging failures
    pub async fn update_status(&self, host_id: HostId, status: HostStatus) {
        if let Err(e) = self.store.update_status(host_id, status).await {
            node_warn!(NodeId::current(), "Could not persist status of host {}: {}", host_id, e);
        }
    }

    /// Mirror the last contact time into the store, logging failures
    pub async fn update_last_seen(&self, host_id: HostId, seen_at: DateTime<Utc>) {
        if let Err(e) = self.store.update_last_seen(host_id, seen_at).await {
            node_warn!(NodeId::current(), "Could not persist last contact of host {}: {}", host_id, e);
        }
    }
}
