//! Ordered key-value storage
//!
//! The server core only talks to [`Store`] and [`Cursor`]. Two backends are
//! provided: [`MemStore`] (volatile) and [`DiskStore`] (same index plus a
//! write-ahead log that is replayed on open).

pub mod disk;
pub mod memory;
pub mod types;
pub mod wal;

pub use disk::DiskStore;
pub use memory::{MemCursor, MemStore, StoreStats};
pub use types::{FsyncMode, Result, StorageBackend, StorageConfig, StorageError, WALEntry};
pub use wal::WriteAheadLog;

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;

/// Point operations plus ordered iteration over byte-string keys.
///
/// Implementations handle their own synchronization for single-key
/// operations; callers add no locking.
#[async_trait]
pub trait Store: Send + Sync {
    /// `None` when the key is absent
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    async fn put(&self, key: Bytes, value: Bytes) -> Result<()>;

    /// Deleting an absent key is not an error
    async fn delete(&self, key: Bytes) -> Result<()>;

    /// New cursor, initially invalid until positioned with a seek
    fn cursor(&self) -> Box<dyn Cursor>;

    /// Number of live keys
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every acknowledged write durable.
    ///
    /// Volatile stores have nothing to do. Called on shutdown, since
    /// periodic fsync only runs when a later write arrives.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Position over a store's keys in lexicographic order.
///
/// Released on drop.
pub trait Cursor: Send {
    fn seek_to_first(&mut self);
    fn seek_to_last(&mut self);
    /// Position at the first key `>= key`
    fn seek(&mut self, key: &[u8]);
    fn next(&mut self);
    fn prev(&mut self);
    fn valid(&self) -> bool;
    /// Empty when the cursor is not valid
    fn key(&self) -> &[u8];
    /// Empty when the cursor is not valid
    fn value(&self) -> &[u8];
}

/// Open the store selected by `config`
pub async fn open_store(config: &StorageConfig, data_dir: &Path) -> Result<Arc<dyn Store>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemStore::new())),
        StorageBackend::Disk => Ok(Arc::new(DiskStore::open(data_dir, config).await?)),
    }
}
