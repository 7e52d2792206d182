//! Transport layer for Stronghold.
//!
//! Provides the [`Transport`] trait that abstracts over listeners, the
//! shared [`Connection`] handle that handlers and background tasks send
//! through, and [`TcpTransport`], the raw TCP listener the legacy client
//! connects to.

#![allow(async_fn_in_trait)]

mod connection;
mod error;
mod tcp;

pub use connection::{Connection, DEFAULT_OUTBOUND_QUEUE};
pub use error::TransportError;
pub use tcp::TcpTransport;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::AsyncRead;

/// Opaque identifier for a connection, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A freshly accepted client: the shared handle plus the read half, which
/// belongs to the connection's read loop alone.
pub struct Accepted<R> {
    pub connection: Arc<Connection>,
    pub reader: R,
}

/// Accepts new incoming connections.
pub trait Transport: Send + 'static {
    /// The read half handed to the per-connection loop.
    type Reader: AsyncRead + Unpin + Send + 'static;

    /// Waits for and accepts the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Accepted<Self::Reader>, TransportError>> + Send;
}

/// Milliseconds since the Unix epoch, the clock the client speaks.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
