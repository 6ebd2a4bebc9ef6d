use crate::protocol::ProtocolError;
use crate::storage::StorageError;
use thiserror::Error;

/// Main error type for replikv server operations
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Replication error: {0}")]
    Replication(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Whether this error was caused by the peer transport (read, decode or write)
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Io(_))
    }
}

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, ServerError>;
