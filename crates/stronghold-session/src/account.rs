//! Hook into the persistence layer for account bookkeeping.
//!
//! The core only needs one thing from account storage: recording when a
//! player was last seen. Storage engines implement [`AccountStore`];
//! [`InMemoryAccountStore`] serves demos and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use stronghold_protocol::PlayerId;
use tokio::sync::Mutex;

use crate::SessionError;

/// Account persistence consumed at join and teardown.
///
/// Stored as `Arc<dyn AccountStore>` in the server, hence `async_trait`
/// rather than return-position `impl Future`.
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    /// Records the last time the player was seen, in Unix millis.
    async fn update_last_seen(&self, player_id: &PlayerId, at_millis: u64)
    -> Result<(), SessionError>;

    /// The last recorded time, if any.
    async fn last_seen(&self, player_id: &PlayerId) -> Result<Option<u64>, SessionError>;
}

/// An [`AccountStore`] backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    last_seen: Mutex<HashMap<PlayerId, u64>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn update_last_seen(
        &self,
        player_id: &PlayerId,
        at_millis: u64,
    ) -> Result<(), SessionError> {
        self.last_seen
            .lock()
            .await
            .insert(player_id.clone(), at_millis);
        Ok(())
    }

    async fn last_seen(&self, player_id: &PlayerId) -> Result<Option<u64>, SessionError> {
        Ok(self.last_seen.lock().await.get(player_id).copied())
    }
}
