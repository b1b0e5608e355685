//! Shared error types for the fleet control plane

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Serialization failed: {message}")]
    SerializationError { message: String },

    #[error("Deserialization failed: {message}")]
    DeserializationError { message: String },

    #[error("Frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Invalid host id: {input}")]
    InvalidHostId { input: String },

    #[error("Unknown status: {input}")]
    InvalidStatus { input: String },

    #[error("Message protocol error: {message}")]
    ProtocolError { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SharedError {
    /// Whether the peer went away (as opposed to a malformed message)
    pub fn is_disconnect(&self) -> bool {
        match self {
            SharedError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
