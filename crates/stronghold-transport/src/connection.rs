//! One live client socket, as seen by handlers and tasks.
//!
//! A [`Connection`] is shared behind an `Arc`: the read loop owns one
//! reference, every handler invocation borrows it, and every background
//! task started for the player keeps one so it can push completion
//! messages. The socket's write half is owned by a dedicated writer task;
//! everyone else sends through a bounded queue.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use stronghold_protocol::{encode, PlayerId, Value};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{unix_millis, ConnectionId, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Default capacity of the outbound queue.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

/// A handle to one accepted client.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    /// Set once, when the join message is processed.
    player: OnceLock<PlayerId>,
    /// Unix millis of the last inbound read.
    last_activity: AtomicU64,
    outbound: mpsc::Sender<Vec<u8>>,
    /// Lives as long as the connection; background tasks hang child
    /// tokens off it.
    context: CancellationToken,
}

impl Connection {
    /// Wraps a socket write half and spawns the writer task that drains
    /// the outbound queue into it.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn spawn<W>(remote_addr: SocketAddr, writer: W, queue_capacity: usize) -> Arc<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (conn, rx) = Self::channel(remote_addr, queue_capacity);
        tokio::spawn(write_loop(
            conn.id,
            writer,
            rx,
            conn.context.clone(),
        ));
        conn
    }

    /// Creates a connection whose outbound bytes land in the returned
    /// receiver instead of a socket.
    ///
    /// The server never uses this; it exists so handlers and tasks can be
    /// driven without a network.
    pub fn channel(
        remote_addr: SocketAddr,
        queue_capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        let conn = Arc::new(Self {
            id,
            remote_addr,
            player: OnceLock::new(),
            last_activity: AtomicU64::new(unix_millis()),
            outbound: tx,
            context: CancellationToken::new(),
        });
        (conn, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    // -- Player identity --------------------------------------------------

    /// The bound player, or `None` while the connection is unauthenticated.
    pub fn player_id(&self) -> Option<&PlayerId> {
        self.player.get()
    }

    /// Binds this connection to a player. Succeeds exactly once.
    ///
    /// # Errors
    /// Returns [`TransportError::AlreadyBound`] on any later call, even
    /// with the same player.
    pub fn bind_player(&self, player_id: PlayerId) -> Result<(), TransportError> {
        self.player.set(player_id).map_err(|_| TransportError::AlreadyBound {
            conn: self.id,
            existing: self.player.get().cloned().unwrap_or_else(|| PlayerId::new("")),
        })?;
        tracing::debug!(conn_id = %self.id, player_id = ?self.player.get(), "player bound");
        Ok(())
    }

    // -- Activity ---------------------------------------------------------

    /// Records inbound activity now.
    pub fn touch(&self) {
        self.last_activity.store(unix_millis(), Ordering::Relaxed);
    }

    /// Unix millis of the last inbound read.
    pub fn last_activity(&self) -> u64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    // -- Sending ----------------------------------------------------------

    /// Queues raw bytes for the socket, bypassing the codec.
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectionClosed`] once the connection
    /// has been shut down.
    pub async fn send_raw(&self, bytes: impl Into<Vec<u8>>) -> Result<(), TransportError> {
        if self.context.is_cancelled() {
            return Err(self.closed());
        }
        self.outbound
            .send(bytes.into())
            .await
            .map_err(|_| self.closed())
    }

    /// Encodes `values` as one frame and queues it.
    pub async fn send_frame(&self, values: &[Value]) -> Result<(), TransportError> {
        let bytes = encode(values)?;
        self.send_raw(bytes).await
    }

    /// Sends `[tag, args...]` as one frame.
    ///
    /// ```rust,ignore
    /// conn.send_message("playerio.joinresult", vec![true.into()]).await?;
    /// ```
    pub async fn send_message(
        &self,
        tag: &str,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<(), TransportError> {
        let mut values = vec![Value::from(tag)];
        values.extend(args);
        self.send_frame(&values).await
    }

    // -- Lifecycle --------------------------------------------------------

    /// The connection's execution context.
    pub fn context(&self) -> &CancellationToken {
        &self.context
    }

    /// A token cancelled when this connection shuts down.
    pub fn child_context(&self) -> CancellationToken {
        self.context.child_token()
    }

    /// Cancels the execution context. The writer task flushes what is
    /// already queued and then closes the socket. Idempotent.
    pub fn shutdown(&self) {
        if !self.context.is_cancelled() {
            tracing::debug!(conn_id = %self.id, "connection shutting down");
        }
        self.context.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.context.is_cancelled() || self.outbound.is_closed()
    }

    fn closed(&self) -> TransportError {
        TransportError::ConnectionClosed(self.id.to_string())
    }
}

/// Drains the outbound queue into the socket until the connection is
/// cancelled or a write fails.
async fn write_loop<W>(
    conn_id: ConnectionId,
    mut writer: W,
    mut rx: mpsc::Receiver<Vec<u8>>,
    context: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;

            next = rx.recv() => {
                let Some(bytes) = next else { break };
                if let Err(e) = writer.write_all(&bytes).await {
                    tracing::debug!(%conn_id, error = %e, "write failed");
                    context.cancel();
                    return;
                }
            }
            () = context.cancelled() => {
                // Flush whatever was queued before the cancel.
                rx.close();
                while let Some(bytes) = rx.recv().await {
                    if writer.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }

    let _ = writer.flush().await;
    let _ = writer.shutdown().await;
    tracing::trace!(%conn_id, "writer stopped");
}

#[cfg(test)]
mod tests {
    use stronghold_protocol::decode;

    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let (a, _rx_a) = Connection::channel(addr(), 4);
        let (b, _rx_b) = Connection::channel(addr(), 4);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_bind_player_succeeds_once() {
        let (conn, _rx) = Connection::channel(addr(), 4);
        assert!(conn.player_id().is_none());

        conn.bind_player(PlayerId::new("p1")).unwrap();
        assert_eq!(conn.player_id().map(PlayerId::as_str), Some("p1"));

        let err = conn.bind_player(PlayerId::new("p2")).unwrap_err();
        assert!(
            matches!(err, TransportError::AlreadyBound { ref existing, .. } if existing.as_str() == "p1")
        );
        assert_eq!(conn.player_id().map(PlayerId::as_str), Some("p1"));
    }

    #[tokio::test]
    async fn test_send_message_frames_tag_and_args() {
        let (conn, mut rx) = Connection::channel(addr(), 4);
        conn.send_message("tu", vec![Value::Double(12.0)]).await.unwrap();

        let bytes = rx.recv().await.unwrap();
        assert_eq!(decode(&bytes).unwrap(), vec![Value::from("tu"), Value::Double(12.0)]);
    }

    #[tokio::test]
    async fn test_send_raw_passes_bytes_through() {
        let (conn, mut rx) = Connection::channel(addr(), 4);
        conn.send_raw(b"hello\0".to_vec()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"hello\0");
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails() {
        let (conn, _rx) = Connection::channel(addr(), 4);
        conn.shutdown();
        assert!(conn.is_closed());

        let err = conn.send_raw(vec![1]).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed(_)));
    }

    #[test]
    fn test_shutdown_cancels_child_contexts() {
        let (conn, _rx) = Connection::channel(addr(), 4);
        let child = conn.child_context();
        conn.shutdown();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_writer_flushes_queue_then_closes() {
        let (client, server) = tokio::io::duplex(1024);
        let conn = Connection::spawn(addr(), server, 8);
        conn.send_raw(b"abc".to_vec()).await.unwrap();
        conn.send_raw(b"def".to_vec()).await.unwrap();
        conn.shutdown();

        let mut client = client;
        let mut received = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut client, &mut received)
            .await
            .unwrap();
        assert_eq!(received, b"abcdef");
    }
}
