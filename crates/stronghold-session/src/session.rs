//! Session types: the server's record of a joined player.
//!
//! A session tracks:
//! - WHO the player is (`PlayerId`)
//! - WHICH connection currently speaks for them (`ConnectionId`)
//! - WHERE they are in the join handshake (connected, online, offline)

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stronghold_protocol::PlayerId;
use stronghold_transport::ConnectionId;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for joining and sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long (in seconds) an issued join key stays valid.
    ///
    /// Default: 600 seconds.
    pub join_key_ttl_secs: u64,

    /// How long (in seconds) a disconnected player's session is kept in
    /// the `Offline` state before it is purged.
    ///
    /// Default: 300 seconds.
    pub offline_retention_secs: u64,
}

impl SessionConfig {
    pub fn join_key_ttl(&self) -> Duration {
        Duration::from_secs(self.join_key_ttl_secs)
    }

    pub fn offline_retention(&self) -> Duration {
        Duration::from_secs(self.offline_retention_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            join_key_ttl_secs: 600,
            offline_retention_secs: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where a player is in the join handshake.
///
/// ```text
///   Connected ──(init complete)──→ Online ──(teardown)──→ Offline
/// ```
///
/// - **Connected**: the join key was accepted; the client is still loading.
/// - **Online**: the client reported init complete and is playing.
/// - **Offline**: the connection is being torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Online,
    Offline { since: Instant },
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single player's session on the server.
#[derive(Debug, Clone)]
pub struct Session {
    pub player_id: PlayerId,
    /// The connection that currently owns this player.
    pub conn_id: ConnectionId,
    pub state: SessionState,
    pub connected_at: Instant,
}

impl Session {
    pub fn is_online(&self) -> bool {
        matches!(self.state, SessionState::Online)
    }
}
