//! Authentication hook and the join-key authenticator.
//!
//! The client never sends a password over the game socket. The login
//! surface (out of scope here) issues a short-lived join key and the
//! client presents it in its first `join` message. [`JoinKeys`] is the
//! in-memory store for those keys.
//!
//! Other schemes plug in through the [`Authenticator`] trait without any
//! change to the join handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use stronghold_protocol::PlayerId;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::SessionError;

/// Validates a client's credential and returns their identity.
///
/// # Example
///
/// ```rust
/// use stronghold_session::{Authenticator, SessionError};
/// use stronghold_protocol::PlayerId;
///
/// /// Accepts any non-empty token as the player id. Development only.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<PlayerId, SessionError> {
///         if token.is_empty() {
///             return Err(SessionError::AuthFailed("empty token".into()));
///         }
///         Ok(PlayerId::new(token))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates the given credential and returns the player's identity.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<PlayerId, SessionError>> + Send;
}

// ---------------------------------------------------------------------------
// JoinKeys
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct IssuedKey {
    player_id: PlayerId,
    issued_at: Instant,
}

/// Single-use join keys with a time-to-live.
///
/// Cloning is cheap; clones share the same key table.
#[derive(Debug, Clone)]
pub struct JoinKeys {
    keys: Arc<Mutex<HashMap<String, IssuedKey>>>,
    ttl: Duration,
}

impl JoinKeys {
    pub fn new(ttl: Duration) -> Self {
        Self {
            keys: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Issues a fresh key for `player_id`.
    pub async fn issue(&self, player_id: PlayerId) -> String {
        let key = generate_key();
        tracing::debug!(%player_id, "join key issued");
        self.keys.lock().await.insert(
            key.clone(),
            IssuedKey {
                player_id,
                issued_at: Instant::now(),
            },
        );
        key
    }

    /// Consumes `key` and returns the player it was issued for.
    ///
    /// # Errors
    /// - [`SessionError::InvalidJoinKey`]: never issued, or already used
    /// - [`SessionError::JoinKeyExpired`]: older than the TTL (the key is
    ///   consumed either way)
    pub async fn resolve(&self, key: &str) -> Result<PlayerId, SessionError> {
        let issued = self
            .keys
            .lock()
            .await
            .remove(key)
            .ok_or(SessionError::InvalidJoinKey)?;

        if issued.issued_at.elapsed() > self.ttl {
            return Err(SessionError::JoinKeyExpired(issued.player_id));
        }
        Ok(issued.player_id)
    }

    /// Drops every expired key. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut keys = self.keys.lock().await;
        let before = keys.len();
        keys.retain(|_, issued| issued.issued_at.elapsed() <= self.ttl);
        let purged = before - keys.len();
        if purged > 0 {
            tracing::debug!(purged, "expired join keys purged");
        }
        purged
    }

    /// Number of outstanding keys, expired or not.
    pub async fn len(&self) -> usize {
        self.keys.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.lock().await.is_empty()
    }
}

impl Authenticator for JoinKeys {
    async fn authenticate(&self, token: &str) -> Result<PlayerId, SessionError> {
        self.resolve(token).await
    }
}

/// Generates a random 32-character hex string (128 bits of entropy).
fn generate_key() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn test_issue_returns_32_hex_chars() {
        let keys = JoinKeys::new(TTL);
        let key = keys.issue(PlayerId::new("p1")).await;
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_resolve_is_single_use() {
        let keys = JoinKeys::new(TTL);
        let key = keys.issue(PlayerId::new("p1")).await;

        assert_eq!(keys.resolve(&key).await.unwrap(), PlayerId::new("p1"));
        assert!(matches!(
            keys.resolve(&key).await,
            Err(SessionError::InvalidJoinKey)
        ));
    }

    #[tokio::test]
    async fn test_resolve_unknown_key_is_invalid() {
        let keys = JoinKeys::new(TTL);
        assert!(matches!(
            keys.resolve("nope").await,
            Err(SessionError::InvalidJoinKey)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_after_ttl_is_expired() {
        let keys = JoinKeys::new(TTL);
        let key = keys.issue(PlayerId::new("p1")).await;

        tokio::time::advance(TTL + Duration::from_secs(1)).await;

        assert!(matches!(
            keys.resolve(&key).await,
            Err(SessionError::JoinKeyExpired(p)) if p.as_str() == "p1"
        ));
        assert!(keys.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_keeps_fresh_keys() {
        let keys = JoinKeys::new(TTL);
        keys.issue(PlayerId::new("old")).await;
        tokio::time::advance(TTL / 2).await;
        let fresh = keys.issue(PlayerId::new("new")).await;
        tokio::time::advance(TTL / 2 + Duration::from_secs(1)).await;

        assert_eq!(keys.purge_expired().await, 1);
        assert_eq!(keys.len().await, 1);
        assert_eq!(keys.resolve(&fresh).await.unwrap(), PlayerId::new("new"));
    }

    #[tokio::test]
    async fn test_clones_share_keys() {
        let keys = JoinKeys::new(TTL);
        let key = keys.clone().issue(PlayerId::new("p1")).await;
        assert!(keys.authenticate(&key).await.is_ok());
    }
}
