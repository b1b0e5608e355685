//! Host resource snapshot types

use serde::{Deserialize, Serialize};

/// Point-in-time resource usage of a host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Unix seconds when the snapshot was taken
    pub timestamp: u64,
    pub cpu_percent: f64,
    pub memory_total: u64,
    pub memory_used: u64,
    pub memory_percent: f64,
    pub disk_total: u64,
    pub disk_used: u64,
    pub disk_percent: f64,
    pub network_sent: u64,
    pub network_recv: u64,
    pub process_count: u32,
    pub uptime_seconds: u64,
}

impl SystemMetrics {
    /// Percentage helper that tolerates a zero total
    pub fn percent(used: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            (used as f64 / total as f64) * 100.0
        }
    }
}
