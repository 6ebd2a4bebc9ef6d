use crate::core::{MutationRecord, Result, ServerError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Default queue capacity
pub const DEFAULT_BROADCAST_CAPACITY: usize = 1000;

/// Bounded FIFO of mutation records shared by the whole server.
///
/// Every successful write pushes one record; replica sessions pop them.
/// Pops are destructive and there is no per-consumer fan-out: with two
/// consumers attached, each record goes to exactly one of them.
///
/// When the queue is full, `publish` waits, which stalls every writer on
/// every connection until a consumer drains it.
#[derive(Clone)]
pub struct MutationBroadcast {
    tx: flume::Sender<MutationRecord>,
    rx: flume::Receiver<MutationRecord>,
    capacity: usize,
    published: Arc<AtomicU64>,
}

impl MutationBroadcast {
    /// Create a queue holding at most `capacity` records
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = flume::bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Push a record, waiting while the queue is full
    pub async fn publish(&self, record: MutationRecord) -> Result<()> {
        trace!("broadcast publish key_len={}", record.key.len());
        self.tx
            .send_async(record)
            .await
            .map_err(|_| ServerError::Internal("mutation broadcast closed".to_string()))?;
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Pop a record if one is immediately available
    pub fn try_next(&self) -> Option<MutationRecord> {
        self.rx.try_recv().ok()
    }

    /// Pop the next record, waiting until one is published
    pub async fn next(&self) -> Result<MutationRecord> {
        self.rx
            .recv_async()
            .await
            .map_err(|_| ServerError::Internal("mutation broadcast closed".to_string()))
    }

    /// Records currently queued
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total records ever published
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for MutationBroadcast {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}
