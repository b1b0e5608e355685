//! Message types exchanged between the controller and host agents
//!
//! - `rpc`: request/response envelopes carried over the agent connection
//! - `metrics`: host resource snapshots
//! - `logs`: streamed console output

pub mod logs;
pub mod metrics;
pub mod rpc;

pub use logs::{LogEntry, LogSource};
pub use metrics::SystemMetrics;
pub use rpc::{AgentInfo, AgentRequest, AgentResponse, CommandResult, HealthStatus, Pong, ServerResult};
