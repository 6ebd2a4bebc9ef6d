pub mod config;
pub mod core;
pub mod protocol;
pub mod replication;
pub mod server;
pub mod storage;

// Re-export commonly used types
pub use config::{LoggingConfig, NetworkConfig, ReplicationConfig, ServerConfig};
pub use core::{MutationKind, MutationRecord, Result, ServerError};
pub use protocol::{Frame, ProtocolError, Request, RespCodec};
pub use replication::{MutationBroadcast, ReplicaClient, ReplicaStats};
pub use server::{AppState, CommandHandler, CommandRouter, Connection, Server, default_router};
pub use storage::{
    Cursor, DiskStore, MemStore, StorageBackend, StorageConfig, StorageError, Store, open_store,
};
