use super::memory::MemStore;
use super::types::{Result, StorageConfig};
use super::wal::WriteAheadLog;
use super::{Cursor, Store};
use crate::core::{MutationKind, MutationRecord};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::info;

/// WAL file name inside the data directory
pub const WAL_FILE_NAME: &str = "replikv.wal";

/// Durable store: a [`MemStore`] index rebuilt from a write-ahead log.
///
/// Writes hold the log mutex across both the append and the index update,
/// so the log order always matches the in-memory state.
pub struct DiskStore {
    index: MemStore,
    wal: Mutex<WriteAheadLog>,
}

impl DiskStore {
    /// Open (or create) the store in `data_dir` and replay its log
    pub async fn open(data_dir: impl AsRef<Path>, config: &StorageConfig) -> Result<Self> {
        let path = data_dir.as_ref().join(WAL_FILE_NAME);
        let mut wal = WriteAheadLog::open(&path, config).await?;

        let index = MemStore::new();
        let entries = wal.replay(0).await?;
        let replayed = entries.len();
        for entry in entries {
            apply(&index, entry.record);
        }

        info!(
            "Store recovered from {:?}: {} entries, {} live keys",
            path,
            replayed,
            index.len()
        );

        if config.compact_on_open && replayed > index.len() {
            let records = index
                .entries()
                .into_iter()
                .map(|(k, v)| MutationRecord::put(k, v))
                .collect();
            wal.rewrite(records).await?;
        }

        Ok(Self {
            index,
            wal: Mutex::new(wal),
        })
    }

    pub fn stats(&self) -> super::StoreStats {
        self.index.stats()
    }
}

fn apply(index: &MemStore, record: MutationRecord) {
    match record.kind {
        MutationKind::Put => index.insert(record.key, record.value),
        MutationKind::Delete => index.remove(&record.key),
    }
}

#[async_trait]
impl Store for DiskStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.index.lookup(key))
    }

    async fn put(&self, key: Bytes, value: Bytes) -> Result<()> {
        let mut wal = self.wal.lock().await;
        wal.append(MutationRecord::put(key.clone(), value.clone()))
            .await?;
        self.index.insert(key, value);
        Ok(())
    }

    async fn delete(&self, key: Bytes) -> Result<()> {
        let mut wal = self.wal.lock().await;
        wal.append(MutationRecord::delete(key.clone())).await?;
        self.index.remove(&key);
        Ok(())
    }

    fn cursor(&self) -> Box<dyn Cursor> {
        self.index.cursor()
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    /// Flush and fsync the log
    async fn flush(&self) -> Result<()> {
        self.wal.lock().await.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsyncMode;
    use tempfile::TempDir;

    fn config() -> StorageConfig {
        StorageConfig {
            fsync_mode: FsyncMode::Never,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_reopen_restores_keyspace() {
        let dir = TempDir::new().unwrap();

        {
            let store = DiskStore::open(dir.path(), &config()).await.unwrap();
            store.put(Bytes::from("a"), Bytes::from("1")).await.unwrap();
            store.put(Bytes::from("b"), Bytes::from("2")).await.unwrap();
            store.put(Bytes::from("a"), Bytes::from("3")).await.unwrap();
            store.delete(Bytes::from("b")).await.unwrap();
            store.flush().await.unwrap();
        }

        let store = DiskStore::open(dir.path(), &config()).await.unwrap();
        assert_eq!(store.get(b"a").await.unwrap(), Some(Bytes::from("3")));
        assert_eq!(store.get(b"b").await.unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_compaction_on_open() {
        let dir = TempDir::new().unwrap();

        {
            let store = DiskStore::open(dir.path(), &config()).await.unwrap();
            for i in 0..20 {
                store
                    .put(Bytes::from("counter"), Bytes::from(i.to_string()))
                    .await
                    .unwrap();
            }
            store.flush().await.unwrap();
        }

        {
            let store = DiskStore::open(dir.path(), &config()).await.unwrap();
            assert_eq!(store.wal.lock().await.next_offset(), 1);
            assert_eq!(store.get(b"counter").await.unwrap(), Some(Bytes::from("19")));
        }

        // Still correct after the rewritten log is replayed
        let store = DiskStore::open(dir.path(), &config()).await.unwrap();
        assert_eq!(store.get(b"counter").await.unwrap(), Some(Bytes::from("19")));
    }

    #[tokio::test]
    async fn test_flush_through_trait_object() {
        let dir = TempDir::new().unwrap();
        let periodic = StorageConfig {
            fsync_mode: FsyncMode::Periodic,
            fsync_interval_ms: 60_000,
            ..Default::default()
        };

        {
            let store: std::sync::Arc<dyn Store> =
                std::sync::Arc::new(DiskStore::open(dir.path(), &periodic).await.unwrap());
            store.put(Bytes::from("k"), Bytes::from("v")).await.unwrap();
            store.flush().await.unwrap();
        }

        let store = DiskStore::open(dir.path(), &periodic).await.unwrap();
        assert_eq!(store.get(b"k").await.unwrap(), Some(Bytes::from("v")));
    }

    #[tokio::test]
    async fn test_cursor_over_disk_store() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::open(dir.path(), &config()).await.unwrap();
        store.put(Bytes::from("y"), Bytes::from("2")).await.unwrap();
        store.put(Bytes::from("x"), Bytes::from("1")).await.unwrap();

        let mut cursor = store.cursor();
        cursor.seek_to_first();
        assert_eq!(cursor.key(), b"x");
        cursor.next();
        assert_eq!(cursor.key(), b"y");
        cursor.next();
        assert!(!cursor.valid());
    }
}
