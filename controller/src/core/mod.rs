//! Connection tracking and health monitoring
//!
//! Everything here talks to agents only through the [`crate::traits`] seams.

pub mod connection;
pub mod monitor;
pub mod registry;

pub use connection::{ConnectionPolicy, ConnectionSnapshot, HostMetrics, RemoteConnection};
pub use monitor::{CheckOutcome, HealthMonitor, MonitorStats};
pub use registry::ConnectionRegistry;

#[cfg(test)]
mod tests;
