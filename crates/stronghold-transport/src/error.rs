use stronghold_protocol::{PlayerId, ProtocolError};

use crate::ConnectionId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed; nothing more can be sent on it.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The connection already belongs to a player.
    #[error("{conn} is already bound to player {existing}")]
    AlreadyBound {
        conn: ConnectionId,
        existing: PlayerId,
    },

    /// An outbound frame could not be encoded.
    #[error(transparent)]
    Encode(#[from] ProtocolError),
}
