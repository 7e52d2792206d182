//! Player session management for Stronghold.
//!
//! This crate handles who a connection speaks for:
//!
//! 1. **Joining**: validating the client's join key ([`Authenticator`]
//!    trait, [`JoinKeys`])
//! 2. **Session tracking**: knowing who is connected and online
//!    ([`SessionManager`])
//! 3. **Account bookkeeping**: last-seen timestamps on disconnect
//!    ([`AccountStore`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Router / handlers (above)  ← bind players to connections on join
//!     ↕
//! Session Layer (this crate)  ← player identity and online state
//!     ↕
//! Protocol / Transport (below)  ← PlayerId, ConnectionId
//! ```
//!
//! # A player's session, start to finish
//!
//! ```text
//! ["join", key]      → JoinKeys::resolve      → SessionManager::create   (Connected)
//! ["ic"]             →                          SessionManager::mark_online (Online)
//! socket closes      → AccountStore::update_last_seen
//!                    →                          SessionManager::mark_offline (Offline)
//! retention passes   →                          SessionManager::purge_offline
//! ```
//!
//! A player may join again from a fresh socket before the old one is
//! noticed as dead. The newer connection takes the session over, and
//! [`SessionManager::is_owned_by`] lets the old connection's teardown see
//! that it no longer speaks for the player.
//!
//! `SessionManager` itself is a plain map. The server keeps it behind a
//! `tokio::sync::Mutex` and never holds that lock across socket I/O.

#![allow(async_fn_in_trait)]

mod account;
mod auth;
mod error;
mod manager;
mod session;

pub use account::{AccountStore, InMemoryAccountStore};
pub use auth::{Authenticator, JoinKeys};
pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Session, SessionConfig, SessionState};
