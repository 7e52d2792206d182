//! What a handler sees while it runs.

use std::sync::Arc;

use stronghold_protocol::{Message, PlayerId, Value};
use stronghold_session::{AccountStore, SessionManager};
use stronghold_task::{ServerTask, TaskDispatcher, TaskId};
use stronghold_transport::Connection;
use tokio::sync::Mutex;

use crate::server::ServerState;
use crate::{ServerConfig, StrongholdError};

/// The connection, the message being handled, and the server's shared
/// services.
///
/// Created by the connection loop for every dispatched message.
pub struct HandlerContext<'a> {
    connection: &'a Arc<Connection>,
    message: &'a Message,
    state: &'a ServerState,
    close_requested: bool,
}

impl<'a> HandlerContext<'a> {
    pub(crate) fn new(
        connection: &'a Arc<Connection>,
        message: &'a Message,
        state: &'a ServerState,
    ) -> Self {
        Self {
            connection,
            message,
            state,
            close_requested: false,
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        self.connection
    }

    pub fn message(&self) -> &Message {
        self.message
    }

    /// The joined player, if any.
    pub fn player_id(&self) -> Option<&PlayerId> {
        self.connection.player_id()
    }

    /// The joined player.
    ///
    /// # Errors
    /// Returns [`StrongholdError::NotJoined`] before the join handshake.
    pub fn require_player(&self) -> Result<&PlayerId, StrongholdError> {
        self.connection
            .player_id()
            .ok_or(StrongholdError::NotJoined(self.connection.id()))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    pub fn tasks(&self) -> &TaskDispatcher {
        &self.state.tasks
    }

    pub fn sessions(&self) -> &Mutex<SessionManager> {
        &self.state.sessions
    }

    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.state.accounts
    }

    /// Starts `task` for this connection's player.
    pub fn start_task<T: ServerTask>(&self, task: T) -> Result<TaskId, StrongholdError> {
        Ok(self.state.tasks.start(self.connection, task)?)
    }

    /// Starts `task`, replacing a running task with the same identity.
    pub fn restart_task<T: ServerTask>(&self, task: T) -> Result<TaskId, StrongholdError> {
        Ok(self.state.tasks.restart(self.connection, task)?)
    }

    /// Sends `[tag, args...]` back to the client.
    pub async fn send_message(
        &self,
        tag: &str,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<(), StrongholdError> {
        self.connection.send_message(tag, args).await?;
        Ok(())
    }

    /// Sends an arbitrary frame back to the client.
    pub async fn send_frame(&self, values: &[Value]) -> Result<(), StrongholdError> {
        self.connection.send_frame(values).await?;
        Ok(())
    }

    /// Closes the connection once this handler returns.
    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }
}
