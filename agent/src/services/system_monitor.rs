//! Host resource metrics backed by `sysinfo`

use async_trait::async_trait;
use std::time::Duration;
use sysinfo::{Disks, Networks, System};

use crate::error::{AgentError, AgentResult};
use crate::traits::MetricsSource;
use shared::{unix_now, SystemMetrics};

/// Gap between the two CPU samples a usage figure is computed from
const CPU_SAMPLE_GAP: Duration = Duration::from_millis(250);

/// Real metrics source reading the local machine
#[derive(Debug, Default, Clone)]
pub struct SysinfoMetrics;

impl SysinfoMetrics {
    pub fn new() -> Self {
        Self
    }

    fn gather() -> SystemMetrics {
        let mut system = System::new();
        system.refresh_cpu();
        std::thread::sleep(CPU_SAMPLE_GAP);
        system.refresh_cpu();
        system.refresh_memory();
        system.refresh_processes();

        let (disk_total, disk_used) = Disks::new_with_refreshed_list()
            .iter()
            .fold((0u64, 0u64), |(total, used), disk| {
                let disk_total = disk.total_space();
                let disk_used = disk_total.saturating_sub(disk.available_space());
                (total.saturating_add(disk_total), used.saturating_add(disk_used))
            });

        let (network_sent, network_recv) = Networks::new_with_refreshed_list()
            .iter()
            .fold((0u64, 0u64), |(sent, recv), (_name, data)| {
                (
                    sent.saturating_add(data.total_transmitted()),
                    recv.saturating_add(data.total_received()),
                )
            });

        let memory_total = system.total_memory();
        let memory_used = system.used_memory();

        SystemMetrics {
            timestamp: unix_now(),
            cpu_percent: f64::from(system.global_cpu_info().cpu_usage()),
            memory_total,
            memory_used,
            memory_percent: SystemMetrics::percent(memory_used, memory_total),
            disk_total,
            disk_used,
            disk_percent: SystemMetrics::percent(disk_used, disk_total),
            network_sent,
            network_recv,
            process_count: system.processes().len() as u32,
            uptime_seconds: System::uptime(),
        }
    }
}

#[async_trait]
impl MetricsSource for SysinfoMetrics {
    async fn collect(&self) -> AgentResult<SystemMetrics> {
        tokio::task::spawn_blocking(Self::gather)
            .await
            .map_err(|e| AgentError::MetricsError { message: e.to_string() })
    }
}

/// Operating system description reported in agent info
pub fn platform() -> String {
    let name = System::name().unwrap_or_else(|| std::env::consts::OS.to_string());
    match System::os_version() {
        Some(version) => format!("{name} {version} ({})", std::env::consts::ARCH),
        None => format!("{name} ({})", std::env::consts::ARCH),
    }
}
