//! Agent-specific error types

use shared::SharedError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Server already exists: {server_id}")]
    DuplicateServer { server_id: String },

    #[error("Maximum number of servers reached ({max_servers})")]
    CapacityExceeded { max_servers: usize },

    #[error("Server not found: {server_id}")]
    ServerNotFound { server_id: String },

    #[error("Invalid server id: {server_id:?}")]
    InvalidServerId { server_id: String },

    #[error("Failed to spawn server {server_id}: {reason}")]
    SpawnFailed { server_id: String, reason: String },

    #[error("Failed to send command to server {server_id}: {reason}")]
    CommandFailed { server_id: String, reason: String },

    #[error("Server {server_id} is already stopping")]
    StopInProgress { server_id: String },

    #[error("Server {server_id} did not exit within {waited:?}")]
    StopTimeout { server_id: String, waited: Duration },

    #[error("Metrics collection failed: {message}")]
    MetricsError { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Network communication error: {message}")]
    NetworkError { message: String },

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type AgentResult<T> = Result<T, AgentError>;

impl AgentError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    pub fn spawn_failed(server_id: &str, reason: impl std::fmt::Display) -> Self {
        Self::SpawnFailed {
            server_id: server_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn not_found(server_id: &str) -> Self {
        Self::ServerNotFound { server_id: server_id.to_string() }
    }
}
