use crate::core::{Result, ServerError};
use crate::protocol::{Frame, Request};
use crate::server::{AppState, CommandHandler, Connection, check_arity};
use crate::storage::Store;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Counters kept by a [`ReplicaClient`]
#[derive(Debug, Default)]
pub struct ReplicaStats {
    applied: AtomicU64,
    ignored: AtomicU64,
}

impl ReplicaStats {
    /// Records written to the local store
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// Records skipped because their command is not `put`/`set`
    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }
}

/// Outcome of applying one streamed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Stored,
    Ignored,
}

/// Pulls a primary's `sync` stream and applies it to the local store.
///
/// Only `put`/`set` records are applied; everything else (including `del`)
/// is skipped. There is no reconnect: the client stops on the first
/// transport, decode or store error, or when the primary closes the stream.
pub struct ReplicaClient {
    store: Arc<dyn Store>,
    primary: String,
    stats: Arc<ReplicaStats>,
}

impl ReplicaClient {
    pub fn new(store: Arc<dyn Store>, host: &str, port: u16) -> Self {
        Self {
            store,
            primary: format!("{}:{}", host, port),
            stats: Arc::new(ReplicaStats::default()),
        }
    }

    /// `host:port` of the primary
    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn stats(&self) -> Arc<ReplicaStats> {
        Arc::clone(&self.stats)
    }

    /// Run in the background; failures are logged, never returned
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            match self.run().await {
                Ok(()) => info!(
                    "primary {} closed the replication stream ({} applied, {} ignored)",
                    self.primary,
                    self.stats.applied(),
                    self.stats.ignored()
                ),
                Err(e) => error!("replication from {} stopped: {}", self.primary, e),
            }
        })
    }

    /// Connect, request `sync 0` and apply records until the stream ends
    pub async fn run(&self) -> Result<()> {
        info!("Connecting to primary at {}", self.primary);
        let mut conn = Connection::connect(self.primary.as_str()).await?;
        conn.send_request(Request::new("sync", ["0"])).await?;
        info!("Replicating from {}", self.primary);

        while let Some(frame) = conn.read_frame().await? {
            self.apply(frame).await?;
        }
        Ok(())
    }

    /// Apply one streamed record to the local store
    pub async fn apply(&self, frame: Frame) -> Result<Applied> {
        let mut items = match frame {
            Frame::Array(items) if !items.is_empty() => items.into_iter(),
            other => {
                return Err(ServerError::Replication(format!(
                    "unexpected frame in sync stream: {:?}",
                    other
                )));
            }
        };

        let name = items.next().map(frame_bytes).transpose()?.unwrap_or_default();
        if !(name.eq_ignore_ascii_case(b"put") || name.eq_ignore_ascii_case(b"set")) {
            debug!(
                "ignoring '{}' from primary",
                String::from_utf8_lossy(&name)
            );
            self.stats.ignored.fetch_add(1, Ordering::Relaxed);
            return Ok(Applied::Ignored);
        }

        let (Some(key), Some(value)) = (items.next(), items.next()) else {
            return Err(ServerError::Replication(
                "put record needs a key and a value".to_string(),
            ));
        };
        let (key, value) = (frame_bytes(key)?, frame_bytes(value)?);

        debug!("apply put key_len={}, size={}", key.len(), value.len());
        self.store.put(key, value).await?;
        self.stats.applied.fetch_add(1, Ordering::Relaxed);
        Ok(Applied::Stored)
    }
}

fn frame_bytes(frame: Frame) -> Result<Bytes> {
    match frame {
        Frame::Bulk(b) => Ok(b),
        Frame::Simple(s) => Ok(Bytes::from(s)),
        other => Err(ServerError::Replication(format!(
            "expected bulk string in sync stream, got {:?}",
            other
        ))),
    }
}

/// `SLAVEOF host port` / `REPLICAOF host port`.
///
/// Replies `+OK` at once; the replication client runs in the background
/// and reports its own failures to the log.
pub struct SlaveofCommand;

#[async_trait]
impl CommandHandler for SlaveofCommand {
    async fn handle(
        &self,
        state: &AppState,
        conn: &mut Connection,
        request: Request,
    ) -> Result<()> {
        if check_arity(conn, &request, 2).await? {
            return Ok(());
        }

        let host = request.arg_str(0).unwrap_or_default();
        let port = request.arg_str(1).unwrap_or_default();
        let port = match port.parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                return conn
                    .write_error(format!("ERR invalid port '{}'", port))
                    .await;
            }
        };

        conn.write_status("OK").await?;
        info!("{} {}:{} requested", request.command(), host, port);
        ReplicaClient::new(Arc::clone(&state.store), &host, port).spawn();
        Ok(())
    }
}
