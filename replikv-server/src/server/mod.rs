//! TCP front end: accept loop, per-connection sessions and command routing

pub mod connection;
pub mod handlers;
pub mod router;
pub mod session;

pub use connection::{Connection, Transport};
pub use handlers::{AppState, DelCommand, GetCommand, PingCommand, STORE_FAILURE_REPLY, SetCommand};
pub(crate) use handlers::check_arity;
pub use router::{CommandHandler, CommandRouter};
pub use session::{Session, SessionState};

use crate::config::ServerConfig;
use crate::core::{Result, ServerError};
use crate::replication::{MutationBroadcast, SlaveofCommand, SyncCommand};
use crate::storage::Store;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Delay before retrying after `failures` consecutive accept errors
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_BACKOFF_MIN
        .saturating_mul(1u32 << failures.saturating_sub(1).min(16))
        .min(ACCEPT_BACKOFF_MAX)
}

/// Router with every built-in command registered
pub fn default_router() -> CommandRouter {
    let mut router = CommandRouter::new();
    router
        .register("set", SetCommand)
        .register("get", GetCommand)
        .register("del", DelCommand)
        .register("ping", PingCommand)
        .register("sync", SyncCommand);

    let slaveof: Arc<dyn CommandHandler> = Arc::new(SlaveofCommand);
    router
        .register_shared("slaveof", Arc::clone(&slaveof))
        .register_shared("replicaof", slaveof);
    router
}

/// The replikv server: owns the shared state and the frozen router
pub struct Server {
    config: ServerConfig,
    state: AppState,
    router: Arc<CommandRouter>,
    limiter: Arc<Semaphore>,
}

impl Server {
    pub fn new(config: ServerConfig, store: Arc<dyn Store>) -> Self {
        let broadcast = MutationBroadcast::new(config.replication.broadcast_capacity);
        let limiter = Arc::new(Semaphore::new(config.server.max_connections));
        Self {
            config,
            state: AppState::new(store, broadcast),
            router: Arc::new(default_router()),
            limiter,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Arc<CommandRouter> {
        Arc::clone(&self.router)
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.server_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!("replikv listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Accept connections forever, one task per session
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut failures = 0u32;
        loop {
            let permit = match Arc::clone(&self.limiter).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return Ok(()),
            };

            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => {
                    failures = 0;
                    accepted
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = accept_backoff(failures);
                    warn!("accept failed: {}, retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!("set_nodelay failed for {}: {}", peer, e);
            }
            debug!("connection from {}", peer);

            let state = self.state.clone();
            let router = Arc::clone(&self.router);
            tokio::spawn(async move {
                let _permit = permit;
                let mut session = Session::new(Connection::new(stream, Some(peer)), state, router);
                if let Err(e) = session.run().await {
                    log_session_error(peer, &e);
                }
            });
        }
    }

    /// Bind, then serve
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }
}

fn log_session_error(peer: SocketAddr, e: &ServerError) {
    match e {
        ServerError::UnknownCommand(_) => debug!("session {} closed: {}", peer, e),
        e if e.is_transport() => debug!("session {} ended: {}", peer, e),
        e => error!("session {} failed: {}", peer, e),
    }
}
