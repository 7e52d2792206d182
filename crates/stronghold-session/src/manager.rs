//! The session manager: tracks every joined player.
//!
//! # Concurrency note
//!
//! `SessionManager` is NOT thread-safe by itself; it uses a plain
//! `HashMap`. The server wraps it in a `tokio::sync::Mutex` and never
//! holds the lock across network I/O.

use std::collections::HashMap;
use std::time::Duration;

use stronghold_protocol::PlayerId;
use stronghold_transport::ConnectionId;
use tokio::time::Instant;

use crate::{Session, SessionError, SessionState};

/// Registry of joined players, keyed by player id.
///
/// ## Lifecycle
///
/// ```text
/// join ──→ create() ──→ mark_online() ──→ mark_offline() ──→ purge_offline()
///             ↑                                 │
///             └────── (rejoin within retention) ┘
/// ```
///
/// A disconnected player stays `Offline` until the retention window
/// passes, so "when did they leave" can still be answered. Rejoining
/// replaces the offline session with a fresh `Connected` one.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<PlayerId, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `conn_id` now speaks for `player_id`.
    ///
    /// A player who joins again from a new connection takes the session
    /// over; the stale connection no longer owns it (see
    /// [`is_owned_by`](Self::is_owned_by)).
    pub fn create(&mut self, player_id: PlayerId, conn_id: ConnectionId) -> &Session {
        if let Some(previous) = self.sessions.get(&player_id) {
            tracing::warn!(
                %player_id,
                old_conn = %previous.conn_id,
                new_conn = %conn_id,
                "player rejoined, replacing session"
            );
        }

        let session = Session {
            player_id: player_id.clone(),
            conn_id,
            state: SessionState::Connected,
            connected_at: Instant::now(),
        };

        tracing::info!(%player_id, %conn_id, "session created");

        // `entry().insert_entry()` hands back the slot we just wrote.
        self.sessions.entry(player_id).insert_entry(session).into_mut()
    }

    /// Marks the player as online (client finished loading).
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if the player never joined.
    pub fn mark_online(&mut self, player_id: &PlayerId) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(player_id)
            .ok_or_else(|| SessionError::NotFound(player_id.clone()))?;
        session.state = SessionState::Online;
        tracing::info!(%player_id, "player online");
        Ok(())
    }

    /// Marks the player as offline.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if no session exists.
    pub fn mark_offline(&mut self, player_id: &PlayerId) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(player_id)
            .ok_or_else(|| SessionError::NotFound(player_id.clone()))?;
        session.state = SessionState::Offline {
            since: Instant::now(),
        };
        tracing::info!(%player_id, "player offline");
        Ok(())
    }

    /// Removes the player's session, releasing their per-session state.
    pub fn remove(&mut self, player_id: &PlayerId) -> Option<Session> {
        self.sessions.remove(player_id)
    }

    /// Drops sessions that have been offline for at least `retention`.
    /// Returns how many were dropped.
    pub fn purge_offline(&mut self, retention: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| match session.state {
            SessionState::Offline { since } => since.elapsed() < retention,
            _ => true,
        });
        let purged = before - self.sessions.len();
        if purged > 0 {
            tracing::debug!(purged, "offline sessions purged");
        }
        purged
    }

    /// `true` if `conn_id` is still the connection speaking for the player.
    pub fn is_owned_by(&self, player_id: &PlayerId, conn_id: ConnectionId) -> bool {
        self.sessions
            .get(player_id)
            .is_some_and(|s| s.conn_id == conn_id)
    }

    pub fn get(&self, player_id: &PlayerId) -> Option<&Session> {
        self.sessions.get(player_id)
    }

    pub fn is_online(&self, player_id: &PlayerId) -> bool {
        self.sessions.get(player_id).is_some_and(Session::is_online)
    }

    /// Number of players currently online.
    pub fn online_count(&self) -> usize {
        self.sessions.values().filter(|s| s.is_online()).count()
    }

    /// Returns the number of sessions (any state).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
