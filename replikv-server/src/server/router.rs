use super::connection::Connection;
use super::handlers::AppState;
use crate::core::{Result, ServerError};
use crate::protocol::Request;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Handler for one command.
///
/// A handler writes its own reply (or, for `sync`, a stream of replies).
/// Returning an error closes the session.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(
        &self,
        state: &AppState,
        conn: &mut Connection,
        request: Request,
    ) -> Result<()>;
}

/// Case-insensitive command name -> handler table.
///
/// Filled once at startup, then shared read-only behind an `Arc`.
#[derive(Default, Clone)]
pub struct CommandRouter {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the handler for `name`
    pub fn register(&mut self, name: &str, handler: impl CommandHandler + 'static) -> &mut Self {
        self.handlers
            .insert(name.to_ascii_lowercase(), Arc::new(handler));
        self
    }

    /// Register an already shared handler under another name
    pub fn register_shared(&mut self, name: &str, handler: Arc<dyn CommandHandler>) -> &mut Self {
        self.handlers.insert(name.to_ascii_lowercase(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered command names, sorted
    pub fn commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Route `request` to its handler.
    ///
    /// Fails with [`ServerError::UnknownCommand`] when no handler matches;
    /// the caller reports it and ends the session.
    pub async fn dispatch(
        &self,
        state: &AppState,
        conn: &mut Connection,
        request: Request,
    ) -> Result<()> {
        let command = request.command();
        let handler = self
            .handlers
            .get(&command)
            .cloned()
            .ok_or_else(|| ServerError::UnknownCommand(command.clone()))?;

        debug!("dispatch {} argc={}", command, request.args.len());
        handler.handle(state, conn, request).await
    }
}
