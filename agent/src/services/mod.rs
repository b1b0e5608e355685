//! Service implementations
//!
//! Real implementations that touch the network and the host machine.

pub mod rpc_server;
pub mod system_monitor;

pub use rpc_server::RpcServer;
pub use system_monitor::SysinfoMetrics;

#[cfg(test)]
mod tests;
