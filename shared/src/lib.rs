//! Shared types for the fleet control plane
//!
//! Contains the types exchanged between the central controller and the host
//! agents: identifiers, server descriptors, RPC messages and the frame codec
//! used to carry them over TCP.

pub mod errors;
pub mod logging;
pub mod messages;
pub mod types;
pub mod wire;

pub use errors::*;
pub use types::*;

pub use messages::{
    // Controller -> Agent
    AgentRequest,

    // Agent -> Controller
    AgentResponse, AgentInfo, CommandResult, HealthStatus, Pong, ServerResult,

    // Host metrics
    SystemMetrics,

    // Log streaming
    LogEntry, LogSource,
};
