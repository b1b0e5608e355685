//! In-memory status store, optionally seeded from a JSON hosts file

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

use crate::error::{ControllerError, ControllerResult};
use crate::traits::{HostRecord, StatusStore};
use shared::{HostId, HostStatus};

#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    hosts: RwLock<HashMap<HostId, HostRecord>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hosts(hosts: impl IntoIterator<Item = HostRecord>) -> Self {
        Self {
            hosts: RwLock::new(hosts.into_iter().map(|h| (h.id, h)).collect()),
        }
    }

    /// Seed from a JSON array of host records
    pub fn from_file(path: impl AsRef<Path>) -> ControllerResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| ControllerError::config(format!("cannot read {}: {e}", path.display())))?;
        let hosts: Vec<HostRecord> = serde_json::from_str(&data)?;
        Ok(Self::with_hosts(hosts))
    }

    /// Current record of a host
    pub async fn get(&self, host_id: HostId) -> Option<HostRecord> {
        self.hosts.read().await.get(&host_id).cloned()
    }

    pub async fn insert(&self, host: HostRecord) {
        self.hosts.write().await.insert(host.id, host);
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn update_status(&self, host_id: HostId, status: HostStatus) -> ControllerResult<()> {
        let mut hosts = self.hosts.write().await;
        let host = hosts
            .get_mut(&host_id)
            .ok_or_else(|| ControllerError::storage(format!("unknown host {host_id}")))?;
        host.status = status;
        Ok(())
    }

    async fn update_last_seen(&self, host_id: HostId, seen_at: DateTime<Utc>) -> ControllerResult<()> {
        let mut hosts = self.hosts.write().await;
        let host = hosts
            .get_mut(&host_id)
            .ok_or_else(|| ControllerError::storage(format!("unknown host {host_id}")))?;
        host.last_seen = Some(seen_at);
        Ok(())
    }

    async fn load_hosts(&self) -> ControllerResult<Vec<HostRecord>> {
        let mut hosts: Vec<_> = self.hosts.read().await.values().cloned().collect();
        hosts.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(hosts)
    }
}
