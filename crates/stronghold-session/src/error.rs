//! Error types for the session layer.

use stronghold_protocol::PlayerId;

/// Errors that can occur during joining and session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Authentication failed: the credential was rejected by the
    /// [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No session exists for the given player.
    #[error("session not found for player {0}")]
    NotFound(PlayerId),

    /// The join key was never issued or has already been used.
    #[error("unknown or already used join key")]
    InvalidJoinKey,

    /// The join key was issued too long ago.
    #[error("join key for player {0} expired")]
    JoinKeyExpired(PlayerId),

    /// The account store failed.
    #[error("account store error: {0}")]
    Store(String),
}
