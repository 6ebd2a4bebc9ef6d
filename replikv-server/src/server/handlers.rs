use super::connection::Connection;
use super::router::CommandHandler;
use crate::core::{MutationRecord, Result};
use crate::protocol::Request;
use crate::replication::MutationBroadcast;
use crate::storage::Store;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Generic reply for a failed store operation
pub const STORE_FAILURE_REPLY: &str = "FAILED";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub broadcast: MutationBroadcast,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, broadcast: MutationBroadcast) -> Self {
        Self { store, broadcast }
    }
}

/// Reply with an arity error and report whether the request was short.
///
/// `min_args` counts arguments after the command name.
pub(crate) async fn check_arity(
    conn: &mut Connection,
    request: &Request,
    min_args: usize,
) -> Result<bool> {
    if request.args.len() >= min_args {
        return Ok(false);
    }
    conn.write_error(format!(
        "ERR wrong number of arguments for '{}' command",
        request.command()
    ))
    .await?;
    Ok(true)
}

/// `SET key value`
pub struct SetCommand;

#[async_trait]
impl CommandHandler for SetCommand {
    async fn handle(
        &self,
        state: &AppState,
        conn: &mut Connection,
        request: Request,
    ) -> Result<()> {
        if check_arity(conn, &request, 2).await? {
            return Ok(());
        }

        let mut args = request.args.into_iter();
        let (Some(key), Some(value)) = (args.next(), args.next()) else {
            return Ok(());
        };
        debug!("SET key_len={}, size={}", key.len(), value.len());

        if let Err(e) = state.store.put(key.clone(), value.clone()).await {
            warn!("SET failed: {}", e);
            return conn.write_error(STORE_FAILURE_REPLY).await;
        }

        state.broadcast.publish(MutationRecord::put(key, value)).await?;
        conn.write_status("OK").await
    }
}

/// `GET key` - bulk value, or nil when the key is absent
pub struct GetCommand;

#[async_trait]
impl CommandHandler for GetCommand {
    async fn handle(
        &self,
        state: &AppState,
        conn: &mut Connection,
        request: Request,
    ) -> Result<()> {
        if check_arity(conn, &request, 1).await? {
            return Ok(());
        }

        match state.store.get(&request.args[0]).await {
            Ok(value) => conn.write_bulk(value).await,
            Err(e) => {
                warn!("GET failed: {}", e);
                conn.write_error(STORE_FAILURE_REPLY).await
            }
        }
    }
}

/// `DEL key`
pub struct DelCommand;

#[async_trait]
impl CommandHandler for DelCommand {
    async fn handle(
        &self,
        state: &AppState,
        conn: &mut Connection,
        request: Request,
    ) -> Result<()> {
        if check_arity(conn, &request, 1).await? {
            return Ok(());
        }

        let key = request.args[0].clone();
        debug!("DEL key_len={}", key.len());

        if let Err(e) = state.store.delete(key.clone()).await {
            warn!("DEL failed: {}", e);
            return conn.write_error(STORE_FAILURE_REPLY).await;
        }

        state.broadcast.publish(MutationRecord::delete(key)).await?;
        conn.write_status("OK").await
    }
}

/// `PING [message]`
pub struct PingCommand;

#[async_trait]
impl CommandHandler for PingCommand {
    async fn handle(
        &self,
        _state: &AppState,
        conn: &mut Connection,
        request: Request,
    ) -> Result<()> {
        match request.args.into_iter().next() {
            Some(message) => conn.write_bulk(Some(message)).await,
            None => conn.write_status("PONG").await,
        }
    }
}
