//! # Stronghold
//!
//! Protocol and task core for a legacy game backend.
//!
//! Stronghold speaks the client's binary frame protocol over raw TCP,
//! routes each decoded message to the first matching [`MessageHandler`],
//! and runs timed game operations as player-scoped background tasks that
//! can be found and cancelled by identity.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stronghold::prelude::*;
//!
//! # async fn run() -> Result<(), StrongholdError> {
//! let join_keys = JoinKeys::new(std::time::Duration::from_secs(600));
//! let server = StrongholdServer::builder()
//!     .config(ServerConfig::default())
//!     .handler(JoinHandler::new(join_keys))
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod builtin;
mod config;
mod context;
mod error;
mod handler;
mod router;
mod server;

pub use builtin::{FallbackHandler, GAME_READY, JOIN, JOIN_RESULT, JoinHandler};
pub use config::ServerConfig;
pub use context::HandlerContext;
pub use error::{RouterError, StrongholdError};
pub use handler::POLICY_REQUEST;
pub use router::{MessageHandler, MessageRouter};
pub use server::{StrongholdServer, StrongholdServerBuilder};

/// Re-exports of the sub-crates, for users who only depend on `stronghold`.
pub use stronghold_protocol as protocol;
pub use stronghold_session as session;
pub use stronghold_task as task;
pub use stronghold_transport as transport;

/// Everything a server binary or handler module usually needs.
pub mod prelude {
    pub use crate::{
        FallbackHandler, HandlerContext, JoinHandler, MessageHandler, MessageRouter,
        RouterError, ServerConfig, StrongholdError, StrongholdServer, StrongholdServerBuilder,
    };
    pub use stronghold_protocol::{Message, PlayerId, ProtocolError, Value};
    pub use stronghold_session::{
        AccountStore, Authenticator, InMemoryAccountStore, JoinKeys, SessionConfig, SessionError,
    };
    pub use stronghold_task::{
        BuildingKind, CancellationReason, ChoreKind, MissionKind, RecycleKind, ServerTask,
        StopMode, TaskCategory, TaskConfig, TaskContext, TaskDispatcher, TaskError, TaskId,
        identity,
    };
    pub use stronghold_transport::{Connection, ConnectionId, TransportError};
}
