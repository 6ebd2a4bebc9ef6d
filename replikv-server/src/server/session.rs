use super::connection::Connection;
use super::handlers::AppState;
use super::router::CommandRouter;
use crate::core::{Result, ServerError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle of one client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Awaiting a full request
    Reading,
    /// Handler is running and writing its reply
    Dispatching,
    /// Terminal
    Closed,
}

/// Per-connection request loop.
///
/// Owns the transport; shares only the store and broadcast (via
/// [`AppState`]) with other sessions.
pub struct Session {
    conn: Connection,
    state: AppState,
    router: Arc<CommandRouter>,
    phase: SessionState,
    requests: u64,
}

impl Session {
    pub fn new(conn: Connection, state: AppState, router: Arc<CommandRouter>) -> Self {
        Self {
            conn,
            state,
            router,
            phase: SessionState::Reading,
            requests: 0,
        }
    }

    pub fn phase(&self) -> SessionState {
        self.phase
    }

    /// Requests dispatched so far
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Serve requests until the peer disconnects or an error closes the session.
    ///
    /// A clean end-of-stream returns `Ok`. An unknown command is reported to
    /// the client before the error is returned.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.serve().await;
        self.phase = SessionState::Closed;
        debug!(
            "session {:?} closed after {} requests",
            self.conn.peer(),
            self.requests
        );
        result
    }

    async fn serve(&mut self) -> Result<()> {
        loop {
            self.phase = SessionState::Reading;
            let request = match self.conn.read_request().await? {
                Some(request) => request,
                None => return Ok(()),
            };

            self.phase = SessionState::Dispatching;
            self.requests += 1;

            match self
                .router
                .dispatch(&self.state, &mut self.conn, request)
                .await
            {
                Ok(()) => {}
                Err(ServerError::UnknownCommand(name)) => {
                    warn!("unknown command '{}' from {:?}", name, self.conn.peer());
                    self.conn
                        .write_error(format!("ERR unknown command '{}'", name))
                        .await?;
                    return Err(ServerError::UnknownCommand(name));
                }
                Err(e) => return Err(e),
            }
        }
    }
}
