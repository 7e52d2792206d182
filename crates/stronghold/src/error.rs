//! Unified error type for the Stronghold server.

use stronghold_protocol::ProtocolError;
use stronghold_session::SessionError;
use stronghold_task::TaskError;
use stronghold_transport::{ConnectionId, TransportError};

/// Routing failures.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Nothing accepted the message and no default handler is installed.
    #[error("no handler matched message {0}")]
    NoHandlerMatched(String),
}

/// Top-level error that wraps all crate-specific errors.
///
/// Handlers return this type; the `#[from]` attribute on each variant
/// lets `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum StrongholdError {
    /// A transport-level error (closed connection, accept, bind).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (malformed frame, unsupported value).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (join key, unknown player).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A task-level error (identity rule, duplicate start).
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Router(#[from] RouterError),

    /// The handler needs a joined player but the connection has none.
    #[error("{0} has not joined")]
    NotJoined(ConnectionId),

    /// A message lacks a field the handler requires.
    #[error("bad request: {0}")]
    BadRequest(String),
}
