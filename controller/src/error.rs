//! Controller-specific error types

use shared::{HostId, HostStatus, SharedError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Host not registered: {host_id}")]
    HostNotFound { host_id: HostId },

    #[error("Host {host_id} has no open connection")]
    NotConnected { host_id: HostId },

    #[error("Host {host_id} is not healthy ({status})")]
    HostUnhealthy { host_id: HostId, status: HostStatus },

    #[error("Host {host_id} is already connecting")]
    ConnectInProgress { host_id: HostId },

    #[error("Failed to connect to {address}: {reason}")]
    DialFailed { address: String, reason: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Connection to agent lost: {message}")]
    ConnectionLost { message: String },

    #[error("Agent error: {message}")]
    RemoteError { message: String },

    #[error("{operation} refused by agent: {message}")]
    OperationFailed { operation: String, message: String },

    #[error("Unexpected response to {operation}")]
    UnexpectedResponse { operation: String },

    #[error("Status store error: {message}")]
    StorageError { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type ControllerResult<T> = Result<T, ControllerError>;

impl ControllerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError { message: message.into() }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Whether the failure says something about reachability of the host
    ///
    /// Application level refusals from a reachable agent do not.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ControllerError::NotConnected { .. }
                | ControllerError::DialFailed { .. }
                | ControllerError::Timeout { .. }
                | ControllerError::ConnectionLost { .. }
                | ControllerError::SharedError(_)
                | ControllerError::IoError(_)
        )
    }
}
