use super::{Cursor, Result, Store};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tracing::debug;

type Tree = BTreeMap<Bytes, Bytes>;

/// Statistics for a store
#[derive(Debug, Default, Clone, Serialize)]
pub struct StoreStats {
    /// Number of GET operations
    pub gets: u64,
    /// Number of PUT operations
    pub sets: u64,
    /// Number of DELETE operations that removed a key
    pub dels: u64,
    pub hits: u64,
    pub misses: u64,
}

impl StoreStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// In-memory ordered key-value store
#[derive(Clone, Default)]
pub struct MemStore {
    data: Arc<RwLock<Tree>>,
    stats: Arc<RwLock<StoreStats>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StoreStats {
        self.stats.read().clone()
    }

    /// All live keys in order
    pub fn keys(&self) -> Vec<Bytes> {
        self.data.read().keys().cloned().collect()
    }

    pub(crate) fn insert(&self, key: Bytes, value: Bytes) {
        self.data.write().insert(key, value);
        self.stats.write().sets += 1;
    }

    pub(crate) fn remove(&self, key: &[u8]) {
        if self.data.write().remove(key).is_some() {
            self.stats.write().dels += 1;
        }
    }

    pub(crate) fn lookup(&self, key: &[u8]) -> Option<Bytes> {
        let value = self.data.read().get(key).cloned();

        let mut stats = self.stats.write();
        stats.gets += 1;
        if value.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        value
    }

    /// Snapshot of every entry, in key order
    pub(crate) fn entries(&self) -> Vec<(Bytes, Bytes)> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        debug!("GET key_len={}", key.len());
        Ok(self.lookup(key))
    }

    async fn put(&self, key: Bytes, value: Bytes) -> Result<()> {
        debug!("PUT key_len={}, size={}", key.len(), value.len());
        self.insert(key, value);
        Ok(())
    }

    async fn delete(&self, key: Bytes) -> Result<()> {
        debug!("DELETE key_len={}", key.len());
        self.remove(&key);
        Ok(())
    }

    fn cursor(&self) -> Box<dyn Cursor> {
        Box::new(MemCursor::new(Arc::clone(&self.data)))
    }

    fn len(&self) -> usize {
        self.data.read().len()
    }
}

/// Live cursor over a [`MemStore`].
///
/// Each step takes a short read lock and looks up the neighbour of the
/// current key, so entries inserted ahead of the cursor are visited and
/// entries deleted ahead of it are skipped.
pub struct MemCursor {
    data: Arc<RwLock<Tree>>,
    current: Option<(Bytes, Bytes)>,
}

impl MemCursor {
    fn new(data: Arc<RwLock<Tree>>) -> Self {
        Self {
            data,
            current: None,
        }
    }

    fn entry(found: Option<(&Bytes, &Bytes)>) -> Option<(Bytes, Bytes)> {
        found.map(|(k, v)| (k.clone(), v.clone()))
    }
}

impl Cursor for MemCursor {
    fn seek_to_first(&mut self) {
        self.current = Self::entry(self.data.read().iter().next());
    }

    fn seek_to_last(&mut self) {
        self.current = Self::entry(self.data.read().iter().next_back());
    }

    fn seek(&mut self, key: &[u8]) {
        let data = self.data.read();
        self.current = Self::entry(
            data.range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
                .next(),
        );
    }

    fn next(&mut self) {
        let Some((key, _)) = self.current.take() else {
            return;
        };
        let data = self.data.read();
        self.current = Self::entry(
            data.range::<[u8], _>((Bound::Excluded(key.as_ref()), Bound::Unbounded))
                .next(),
        );
    }

    fn prev(&mut self) {
        let Some((key, _)) = self.current.take() else {
            return;
        };
        let data = self.data.read();
        self.current = Self::entry(
            data.range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key.as_ref())))
                .next_back(),
        );
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> &[u8] {
        self.current.as_ref().map(|(k, _)| k.as_ref()).unwrap_or_default()
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map(|(_, v)| v.as_ref()).unwrap_or_default()
    }
}
