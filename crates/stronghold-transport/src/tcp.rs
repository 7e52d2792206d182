//! Raw TCP transport: the legacy client speaks binary frames straight
//! over the socket with no outer framing.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpListener;

use crate::connection::DEFAULT_OUTBOUND_QUEUE;
use crate::{Accepted, Connection, Transport, TransportError};

/// A TCP [`Transport`] listening on one address.
pub struct TcpTransport {
    listener: TcpListener,
    queue_capacity: usize,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self {
            listener,
            queue_capacity: DEFAULT_OUTBOUND_QUEUE,
        })
    }

    /// Sets the per-connection outbound queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// The address actually bound (useful after binding port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for TcpTransport {
    type Reader = OwnedReadHalf;

    async fn accept(&mut self) -> Result<Accepted<Self::Reader>, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        // Frames are small and latency-sensitive.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%addr, error = %e, "failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let connection: Arc<Connection> = Connection::spawn(addr, writer, self.queue_capacity);
        tracing::debug!(conn_id = %connection.id(), %addr, "accepted TCP connection");

        Ok(Accepted { connection, reader })
    }
}
