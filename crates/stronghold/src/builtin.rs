//! Handlers every server installs: the join handshake and the fallback.

use async_trait::async_trait;
use stronghold_protocol::{Message, Value};
use stronghold_session::Authenticator;
use stronghold_transport::{TransportError, unix_millis};

use crate::{HandlerContext, MessageHandler, StrongholdError};

/// Key carrying the join credential.
pub const JOIN: &str = "join";
/// Reply to a join.
pub const JOIN_RESULT: &str = "playerio.joinresult";
/// Sent after a successful join; the client starts loading.
pub const GAME_READY: &str = "gr";

/// Handles `["join", <key>, ...]`.
///
/// Resolves the key through the [`Authenticator`], binds the player to
/// the connection, opens their session, and replies with
/// `["playerio.joinresult", true]` followed by `["gr", <server time>]`.
/// A rejected key gets `["playerio.joinresult", false]` and the
/// connection is closed.
///
/// Joining again from a new connection takes the session over and stops
/// every task the player still had running. A second join on an already
/// joined connection fails with [`TransportError::AlreadyBound`] without
/// spending its key.
pub struct JoinHandler<A> {
    auth: A,
}

impl<A: Authenticator> JoinHandler<A> {
    pub fn new(auth: A) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl<A: Authenticator> MessageHandler for JoinHandler<A> {
    fn name(&self) -> &str {
        "join"
    }

    fn matches(&self, message: &Message) -> bool {
        message.get_str(JOIN).is_some()
    }

    async fn handle(&self, ctx: &mut HandlerContext<'_>) -> Result<(), StrongholdError> {
        let conn_id = ctx.connection().id();
        // Checked before the key is consumed: keys are single-use.
        if let Some(existing) = ctx.player_id() {
            return Err(TransportError::AlreadyBound {
                conn: conn_id,
                existing: existing.clone(),
            }
            .into());
        }
        let key = ctx
            .message()
            .get_str(JOIN)
            .ok_or_else(|| StrongholdError::BadRequest("join without a key".into()))?
            .to_owned();

        let player_id = match self.auth.authenticate(&key).await {
            Ok(player_id) => player_id,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "join rejected");
                ctx.send_message(JOIN_RESULT, [Value::Bool(false)]).await?;
                ctx.request_close();
                return Ok(());
            }
        };

        ctx.connection().bind_player(player_id.clone())?;
        let superseded = {
            let mut sessions = ctx.sessions().lock().await;
            let previous = sessions
                .get(&player_id)
                .map(|session| session.conn_id)
                .filter(|previous| *previous != conn_id);
            sessions.create(player_id.clone(), conn_id);
            previous
        };
        if let Some(old_conn) = superseded {
            // The old connection's timers would otherwise hold the ids
            // this connection needs.
            let stopped = ctx.tasks().stop_all_for_player(&player_id);
            tracing::info!(%player_id, %old_conn, stopped_tasks = stopped, "rejoin superseded connection");
        }
        tracing::info!(%conn_id, %player_id, "player joined");

        ctx.send_message(JOIN_RESULT, [Value::Bool(true)]).await?;
        ctx.send_message(GAME_READY, [Value::Double(unix_millis() as f64)])
            .await
    }
}

/// Catch-all for messages nothing else handles.
///
/// Logs the message kind and acknowledges with `["\0\0\0\0"]` so the
/// client does not stall waiting for a reply.
#[derive(Debug, Default)]
pub struct FallbackHandler;

#[async_trait]
impl MessageHandler for FallbackHandler {
    fn name(&self) -> &str {
        "fallback"
    }

    fn matches(&self, _message: &Message) -> bool {
        true
    }

    async fn handle(&self, ctx: &mut HandlerContext<'_>) -> Result<(), StrongholdError> {
        tracing::warn!(
            conn_id = %ctx.connection().id(),
            kind = %ctx.message().kind(),
            "no handler for message"
        );
        ctx.send_frame(&[Value::from("\0\0\0\0")]).await
    }
}
