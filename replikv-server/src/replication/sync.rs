use crate::core::{MutationRecord, Result};
use crate::protocol::Request;
use crate::server::{AppState, CommandHandler, Connection};
use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// `SYNC offset` - stream the keyspace, then every later mutation.
///
/// Only offset `0` is meaningful; any other value is treated as `0`.
/// The handler returns only when the transport fails.
pub struct SyncCommand;

#[async_trait]
impl CommandHandler for SyncCommand {
    async fn handle(
        &self,
        state: &AppState,
        conn: &mut Connection,
        request: Request,
    ) -> Result<()> {
        let session = Uuid::new_v4();
        let offset = request.arg_str(0).unwrap_or_else(|| "0".to_string());
        if offset != "0" {
            warn!(
                "replica {} requested offset {}, resuming from 0",
                session, offset
            );
        }
        info!("replica {} attached from {:?}", session, conn.peer());

        let sent = send_snapshot(state, conn).await?;
        info!("replica {} snapshot complete: {} entries", session, sent);

        stream_tail(state, conn, session).await
    }
}

/// Snapshot phase: walk the store in key order.
///
/// After each entry, one queued record is popped without waiting. It is
/// forwarded only when its key sorts before the cursor's current key;
/// otherwise it is dropped. Returns the number of snapshot entries sent.
async fn send_snapshot(state: &AppState, conn: &mut Connection) -> Result<u64> {
    let mut cursor = state.store.cursor();
    cursor.seek_to_first();

    let mut sent = 0u64;
    while cursor.valid() {
        let record = MutationRecord::put(cursor.key().to_vec(), cursor.value().to_vec());
        conn.write_frame(record.to_frame()).await?;
        sent += 1;

        if let Some(live) = state.broadcast.try_next() {
            if live.key.as_ref() < cursor.key() {
                conn.write_frame(live.to_frame()).await?;
            } else {
                debug!("dropped live record during snapshot (key_len={})", live.key.len());
            }
        }

        cursor.next();
    }
    Ok(sent)
}

/// Tail phase: forward every record as it is published
async fn stream_tail(state: &AppState, conn: &mut Connection, session: Uuid) -> Result<()> {
    loop {
        let record = state.broadcast.next().await?;
        debug!(
            "replica {} <- {} key_len={}",
            session,
            record.kind.command_name(),
            record.key.len()
        );
        conn.write_frame(record.to_frame()).await?;
    }
}
