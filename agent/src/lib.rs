//! Host agent for the game server control plane
//!
//! Runs on every host, supervises the game server processes there and
//! answers controller requests over a length-prefixed bincode TCP protocol.

pub mod agent;
pub mod config;
pub mod core;
pub mod error;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use agent::Agent;
pub use config::AgentConfig;
pub use core::{JavaLauncher, LogBuffer, ProcessSupervisor, ServerRegistry};
pub use error::{AgentError, AgentResult};
pub use traits::{LaunchBuilder, MetricsSource};
