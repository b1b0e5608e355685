//! Central controller for the game server control plane
//!
//! Keeps one connection per host agent, watches their health and exposes a
//! control facade for starting, stopping and inspecting game servers.

pub mod config;
pub mod core;
pub mod error;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use config::ControllerConfig;
pub use core::{ConnectionPolicy, ConnectionRegistry, HealthMonitor, RemoteConnection};
pub use error::{ControllerError, ControllerResult};
pub use services::{ControlService, MemoryStatusStore, TcpConnector};
pub use traits::{AgentClient, Connector, HostRecord, StatusStore};
