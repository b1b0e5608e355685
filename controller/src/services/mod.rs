//! Service implementations
//!
//! The TCP agent client, the in-memory status store and the control facade
//! used by callers of the controller.

pub mod control;
pub mod status_store;
pub mod tcp_client;

pub use control::ControlService;
pub use status_store::MemoryStatusStore;
pub use tcp_client::{TcpAgentClient, TcpConnector};
