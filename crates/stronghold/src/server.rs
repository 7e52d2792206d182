//! `StrongholdServer` builder and accept loops.
//!
//! This is the entry point for running a Stronghold server. It ties
//! together all the layers: transport → protocol → router → tasks.

use std::net::SocketAddr;
use std::sync::Arc;

use stronghold_protocol::Message;
use stronghold_session::{AccountStore, InMemoryAccountStore, SessionManager};
use stronghold_task::TaskDispatcher;
use stronghold_transport::{Accepted, TcpTransport, Transport};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::handler::handle_connection;
use crate::{FallbackHandler, MessageHandler, MessageRouter, ServerConfig, StrongholdError};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState {
    pub(crate) config: ServerConfig,
    pub(crate) router: MessageRouter,
    pub(crate) tasks: TaskDispatcher,
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) accounts: Arc<dyn AccountStore>,
}

/// Builder for configuring and starting a Stronghold server.
///
/// # Example
///
/// ```rust,ignore
/// use stronghold::prelude::*;
///
/// let server = StrongholdServer::builder()
///     .config(config)
///     .tasks(dispatcher)
///     .handler(JoinHandler::new(join_keys))
///     .handler(InitCompleteHandler)
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct StrongholdServerBuilder {
    config: ServerConfig,
    router: MessageRouter,
    has_default: bool,
    tasks: Option<TaskDispatcher>,
    accounts: Option<Arc<dyn AccountStore>>,
}

impl StrongholdServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            router: MessageRouter::new(),
            has_default: false,
            tasks: None,
            accounts: None,
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Appends a handler; earlier handlers win.
    pub fn handler(self, handler: impl MessageHandler) -> Self {
        self.router.register(handler);
        self
    }

    /// Appends a handler selected by `predicate` rather than its own
    /// `matches`.
    pub fn handler_with<F>(self, predicate: F, handler: impl MessageHandler) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.router.register_with(predicate, handler);
        self
    }

    /// Replaces the [`FallbackHandler`] installed by default.
    pub fn default_handler(mut self, handler: impl MessageHandler) -> Self {
        self.router.set_default(handler);
        self.has_default = true;
        self
    }

    /// The dispatcher handlers start tasks through.
    ///
    /// Without one, the server uses a dispatcher with no identity rules,
    /// so every task start fails.
    pub fn tasks(mut self, tasks: TaskDispatcher) -> Self {
        self.tasks = Some(tasks);
        self
    }

    /// Where last-seen timestamps go. Defaults to an
    /// [`InMemoryAccountStore`].
    pub fn accounts(mut self, accounts: Arc<dyn AccountStore>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    /// Binds one listener per configured port.
    ///
    /// # Errors
    /// Fails if any port cannot be bound.
    pub async fn build(self) -> Result<StrongholdServer, StrongholdError> {
        let config = self.config.validated();

        let mut listeners = Vec::with_capacity(config.ports.len());
        for port in &config.ports {
            let transport = TcpTransport::bind(&format!("{}:{port}", config.host))
                .await?
                .with_queue_capacity(config.outbound_queue);
            listeners.push(transport);
        }

        if !self.has_default {
            self.router.set_default(FallbackHandler);
        }

        let tasks = match self.tasks {
            Some(tasks) => tasks,
            None => TaskDispatcher::builder().require([]).build()?,
        };

        let state = Arc::new(ServerState {
            config,
            router: self.router,
            tasks,
            sessions: Mutex::new(SessionManager::new()),
            accounts: self
                .accounts
                .unwrap_or_else(|| Arc::new(InMemoryAccountStore::new())),
        });

        Ok(StrongholdServer {
            listeners,
            state,
            shutdown: CancellationToken::new(),
        })
    }
}

impl Default for StrongholdServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Stronghold server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct StrongholdServer {
    listeners: Vec<TcpTransport>,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
}

impl StrongholdServer {
    pub fn builder() -> StrongholdServerBuilder {
        StrongholdServerBuilder::new()
    }

    /// The addresses the listeners are bound to, in port order.
    pub fn local_addrs(&self) -> std::io::Result<Vec<SocketAddr>> {
        self.listeners.iter().map(TcpTransport::local_addr).collect()
    }

    /// Cancelling this token stops the server.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn tasks(&self) -> &TaskDispatcher {
        &self.state.tasks
    }

    pub fn accounts(&self) -> Arc<dyn AccountStore> {
        Arc::clone(&self.state.accounts)
    }

    /// Runs every accept loop until the shutdown token is cancelled.
    ///
    /// Live connections observe the same token and tear down; remaining
    /// tasks are cancelled before this returns.
    pub async fn run(self) -> Result<(), StrongholdError> {
        tracing::info!(ports = ?self.state.config.ports, "stronghold server running");

        let mut loops = JoinSet::new();
        for transport in self.listeners {
            loops.spawn(accept_loop(
                transport,
                Arc::clone(&self.state),
                self.shutdown.clone(),
            ));
        }
        loops.spawn(sweep_loop(Arc::clone(&self.state), self.shutdown.clone()));
        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "server loop crashed");
            }
        }

        self.state.tasks.shutdown();
        tracing::info!("stronghold server stopped");
        Ok(())
    }
}

async fn accept_loop<T: Transport>(
    mut transport: T,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = transport.accept() => accepted,
        };

        match accepted {
            Ok(Accepted { connection, reader }) => {
                tokio::spawn(handle_connection(
                    connection,
                    reader,
                    Arc::clone(&state),
                    shutdown.clone(),
                ));
            }
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
            }
        }
    }
}

/// Purges offline sessions once their retention window has passed.
async fn sweep_loop(state: Arc<ServerState>, shutdown: CancellationToken) {
    let retention = state.config.session.offline_retention();
    let mut interval = tokio::time::interval(retention.max(MIN_SWEEP_INTERVAL));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {
                state.sessions.lock().await.purge_offline(retention);
            }
        }
    }
}
