use crate::core::MutationRecord;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Storage error types
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("WAL corrupted at offset {offset}: {reason}")]
    WALCorrupted { offset: u64, reason: String },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<bincode::error::EncodeError> for StorageError {
    fn from(e: bincode::error::EncodeError) -> Self {
        StorageError::SerializationError(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for StorageError {
    fn from(e: bincode::error::DecodeError) -> Self {
        StorageError::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// WAL entry wrapping a single mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WALEntry {
    pub offset: u64,
    pub timestamp: u64,
    pub record: MutationRecord,
}

/// Which store implementation backs the server
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile, in-memory only
    Memory,
    /// In-memory index plus write-ahead log
    #[default]
    Disk,
}

/// Fsync mode for WAL
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FsyncMode {
    /// Fsync after every write (safest, slowest)
    Always,
    /// Fsync periodically (balanced)
    #[default]
    Periodic,
    /// Never fsync (fastest, least safe)
    Never,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Data directory; `db-<port>` when unset
    pub data_dir: Option<PathBuf>,
    pub fsync_mode: FsyncMode,
    pub fsync_interval_ms: u64,
    /// Rewrite the WAL down to live keys when opening
    pub compact_on_open: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Disk,
            data_dir: None,
            fsync_mode: FsyncMode::Periodic,
            fsync_interval_ms: 1000,
            compact_on_open: true,
        }
    }
}
