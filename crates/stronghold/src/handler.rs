//! Per-connection loop: framing, dispatch, and teardown.
//!
//! Each accepted connection gets its own Tokio task running this loop.
//! The flow is:
//!   1. Read whatever bytes are available
//!   2. Answer the policy-file request, if that is what arrived, and close
//!   3. Strip the transport's leading zero byte, feed the frame decoder
//!   4. Dispatch every completed frame, in order, through the router
//!   5. On disconnect, malformed input, or socket error: tear down

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use stronghold_protocol::{FrameDecoder, Message};
use stronghold_transport::{Connection, TransportError, unix_millis};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::server::ServerState;
use crate::{HandlerContext, StrongholdError};

/// The out-of-protocol request the client sends before speaking frames.
pub const POLICY_REQUEST: &[u8] = b"<policy-file-request/>";

/// Why a read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEnd {
    Disconnected,
    PolicyServed,
    Malformed,
    SocketError,
    IdleTimeout,
    CloseRequested,
    Closed,
    ServerShutdown,
}

/// Handles a single connection from accept to close.
///
/// Teardown runs whether the loop ended cleanly, failed, or panicked.
pub(crate) async fn handle_connection<R>(
    connection: Arc<Connection>,
    reader: R,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let conn_id = connection.id();
    tracing::debug!(%conn_id, remote = %connection.remote_addr(), "handling new connection");

    let outcome = AssertUnwindSafe(read_loop(&connection, reader, &state, &shutdown))
        .catch_unwind()
        .await;
    match outcome {
        Ok(end) => tracing::debug!(%conn_id, reason = ?end, "read loop ended"),
        Err(_) => tracing::error!(%conn_id, "connection handler panicked"),
    }

    if AssertUnwindSafe(teardown(&connection, &state))
        .catch_unwind()
        .await
        .is_err()
    {
        tracing::error!(%conn_id, "teardown panicked");
    }
    connection.shutdown();
}

async fn read_loop<R>(
    connection: &Arc<Connection>,
    mut reader: R,
    state: &ServerState,
    shutdown: &CancellationToken,
) -> LoopEnd
where
    R: AsyncRead + Unpin,
{
    let conn_id = connection.id();
    let idle_timeout = state.config.idle_timeout();
    let mut buf = vec![0u8; state.config.read_buffer_size];
    let mut decoder = FrameDecoder::new(state.config.max_value_len);
    // Start of a policy request split across reads.
    let mut policy_prefix = Vec::new();

    loop {
        let read = tokio::select! {
            () = shutdown.cancelled() => return LoopEnd::ServerShutdown,
            () = connection.context().cancelled() => return LoopEnd::Closed,
            read = read_some(&mut reader, &mut buf, idle_timeout) => read,
        };

        let n = match read {
            Ok(Some(0)) => {
                tracing::info!(%conn_id, "connection closed by peer");
                return LoopEnd::Disconnected;
            }
            Ok(Some(n)) => n,
            Ok(None) => {
                tracing::info!(%conn_id, "connection idle, closing");
                return LoopEnd::IdleTimeout;
            }
            Err(e) => {
                tracing::info!(%conn_id, error = %e, "socket error");
                return LoopEnd::SocketError;
            }
        };
        connection.touch();

        let held: Vec<u8>;
        let mut data = &buf[..n];
        if !decoder.has_partial() {
            if !policy_prefix.is_empty() {
                policy_prefix.extend_from_slice(data);
                held = std::mem::take(&mut policy_prefix);
                data = &held;
            }
            if data.starts_with(POLICY_REQUEST) {
                tracing::debug!(%conn_id, "policy file request");
                if let Err(e) = connection.send_raw(state.config.policy_reply()).await {
                    tracing::debug!(%conn_id, error = %e, "policy reply not sent");
                }
                return LoopEnd::PolicyServed;
            }
            if data.len() < POLICY_REQUEST.len() && POLICY_REQUEST.starts_with(data) {
                policy_prefix = data.to_vec();
                continue;
            }
            if let [0, rest @ ..] = data {
                data = rest;
            }
        }

        let frames = match decoder.feed(data) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "malformed frame");
                return LoopEnd::Malformed;
            }
        };
        if frames.is_empty() {
            tracing::debug!(%conn_id, bytes = n, "no complete frame");
            continue;
        }

        for values in frames {
            let message = Message::from_values(values);
            let mut ctx = HandlerContext::new(connection, &message, state);

            match state.router.dispatch(&mut ctx).await {
                Ok(()) => {}
                Err(StrongholdError::Transport(TransportError::ConnectionClosed(_))) => {
                    return LoopEnd::Closed;
                }
                Err(StrongholdError::Router(e)) => {
                    tracing::warn!(%conn_id, error = %e, "unrouted message");
                }
                Err(e) => {
                    tracing::warn!(%conn_id, kind = %message.kind(), error = %e, "handler failed");
                }
            }

            if ctx.close_requested() {
                return LoopEnd::CloseRequested;
            }
        }
    }
}

/// Reads once. `Ok(None)` means the idle timeout elapsed first.
async fn read_some<R>(
    reader: &mut R,
    buf: &mut [u8],
    idle_timeout: Option<Duration>,
) -> Result<Option<usize>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let read = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, reader.read(buf)).await {
            Ok(read) => read,
            Err(_) => return Ok(None),
        },
        None => reader.read(buf).await,
    };
    read.map(Some).map_err(TransportError::ReceiveFailed)
}

/// Releases everything the connection's player held.
///
/// The session is left `Offline` for the sweeper to purge. A player who
/// already rejoined from another connection keeps their session; the
/// rejoin stopped this connection's tasks already.
async fn teardown(connection: &Connection, state: &ServerState) {
    let conn_id = connection.id();
    let Some(player_id) = connection.player_id() else {
        tracing::debug!(%conn_id, "closing unauthenticated connection");
        return;
    };

    let owned = {
        let mut sessions = state.sessions.lock().await;
        if sessions.is_owned_by(player_id, conn_id) {
            if let Err(e) = sessions.mark_offline(player_id) {
                tracing::debug!(%player_id, error = %e, "mark offline failed");
            }
            true
        } else {
            false
        }
    };
    if !owned {
        tracing::debug!(%conn_id, %player_id, "session belongs to a newer connection");
        return;
    }

    if let Err(e) = state
        .accounts
        .update_last_seen(player_id, unix_millis())
        .await
    {
        tracing::warn!(%player_id, error = %e, "failed to record last seen");
    }

    let stopped = state.tasks.stop_all_for_player(player_id);
    tracing::info!(%conn_id, %player_id, stopped_tasks = stopped, "player disconnected");
}
