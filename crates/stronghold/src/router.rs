//! Message routing: an ordered list of predicate-matched handlers.
//!
//! Routes are tried front to back and the first match wins, so narrow
//! handlers go before broad ones. The default handler, if installed,
//! catches whatever nothing else accepted.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use stronghold_protocol::Message;

use crate::{HandlerContext, RouterError, StrongholdError};

/// Handles one kind of client message.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use stronghold::prelude::*;
///
/// struct Ping;
///
/// #[async_trait]
/// impl MessageHandler for Ping {
///     fn name(&self) -> &str {
///         "ping"
///     }
///
///     fn matches(&self, message: &Message) -> bool {
///         message.is("ping")
///     }
///
///     async fn handle(&self, ctx: &mut HandlerContext<'_>) -> Result<(), StrongholdError> {
///         ctx.send_message("pong", []).await
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Shown in logs.
    fn name(&self) -> &str;

    /// Whether this handler accepts `message` when registered with
    /// [`MessageRouter::register`].
    fn matches(&self, message: &Message) -> bool;

    async fn handle(&self, ctx: &mut HandlerContext<'_>) -> Result<(), StrongholdError>;
}

type Predicate = Box<dyn Fn(&Message) -> bool + Send + Sync>;

struct Route {
    /// Overrides [`MessageHandler::matches`] when set.
    predicate: Option<Predicate>,
    handler: Arc<dyn MessageHandler>,
}

impl Route {
    fn accepts(&self, message: &Message) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(message),
            None => self.handler.matches(message),
        }
    }
}

/// Ordered handler registry.
///
/// Registration may happen while connections are dispatching; lookups
/// clone the matched handler out so no lock is held while it runs.
#[derive(Default)]
pub struct MessageRouter {
    routes: RwLock<Vec<Route>>,
    default: RwLock<Option<Arc<dyn MessageHandler>>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler matched by its own [`MessageHandler::matches`].
    pub fn register(&self, handler: impl MessageHandler) {
        self.push(Route {
            predicate: None,
            handler: Arc::new(handler),
        });
    }

    /// Appends a handler matched by `predicate` instead.
    pub fn register_with<F>(&self, predicate: F, handler: impl MessageHandler)
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.push(Route {
            predicate: Some(Box::new(predicate)),
            handler: Arc::new(handler),
        });
    }

    /// Installs the catch-all handler, replacing any previous one.
    pub fn set_default(&self, handler: impl MessageHandler) {
        let handler: Arc<dyn MessageHandler> = Arc::new(handler);
        tracing::debug!(handler = handler.name(), "default handler set");
        *self.default.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// The handler for `message`: the first matching route, else the
    /// default.
    ///
    /// # Errors
    /// [`RouterError::NoHandlerMatched`] if nothing matches and no default
    /// is installed.
    pub fn resolve(&self, message: &Message) -> Result<Arc<dyn MessageHandler>, RouterError> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(route) = routes.iter().find(|r| r.accepts(message)) {
            return Ok(Arc::clone(&route.handler));
        }
        drop(routes);

        self.default
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| RouterError::NoHandlerMatched(message.kind()))
    }

    /// Resolves the context's message and runs the handler.
    pub async fn dispatch(&self, ctx: &mut HandlerContext<'_>) -> Result<(), StrongholdError> {
        let handler = self.resolve(ctx.message())?;
        tracing::trace!(
            conn_id = %ctx.connection().id(),
            handler = handler.name(),
            kind = %ctx.message().kind(),
            "dispatching"
        );
        handler.handle(ctx).await
    }

    /// Number of registered routes, not counting the default.
    pub fn len(&self) -> usize {
        self.routes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, route: Route) {
        tracing::debug!(handler = route.handler.name(), "handler registered");
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route);
    }
}

#[cfg(test)]
mod tests {
    use stronghold_protocol::Value;

    use super::*;

    struct Named {
        name: &'static str,
        tag: Option<&'static str>,
    }

    #[async_trait]
    impl MessageHandler for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn matches(&self, message: &Message) -> bool {
            self.tag.is_none_or(|tag| message.is(tag))
        }

        async fn handle(&self, _ctx: &mut HandlerContext<'_>) -> Result<(), StrongholdError> {
            Ok(())
        }
    }

    fn handler(name: &'static str, tag: &'static str) -> Named {
        Named {
            name,
            tag: Some(tag),
        }
    }

    fn catch_all(name: &'static str) -> Named {
        Named { name, tag: None }
    }

    fn msg(values: Vec<Value>) -> Message {
        Message::from_values(values)
    }

    fn tagged(tag: &str) -> Message {
        msg(vec![tag.into(), "k".into(), "v".into()])
    }

    #[test]
    fn test_first_registered_match_wins() {
        let router = MessageRouter::new();
        router.register(handler("narrow", "join"));
        router.register(catch_all("broad"));

        assert_eq!(router.resolve(&tagged("join")).unwrap().name(), "narrow");
        assert_eq!(router.resolve(&tagged("other")).unwrap().name(), "broad");
    }

    #[test]
    fn test_registration_order_alone_decides() {
        let router = MessageRouter::new();
        router.register(catch_all("broad"));
        router.register(handler("narrow", "join"));

        assert_eq!(router.resolve(&tagged("join")).unwrap().name(), "broad");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let router = MessageRouter::new();
        router.register(handler("a", "x"));
        router.register(handler("b", "x"));

        for _ in 0..10 {
            assert_eq!(router.resolve(&tagged("x")).unwrap().name(), "a");
        }
    }

    #[test]
    fn test_default_only_catches_everything() {
        let router = MessageRouter::new();
        router.set_default(catch_all("fallback"));

        assert_eq!(router.resolve(&tagged("anything")).unwrap().name(), "fallback");
        assert_eq!(router.resolve(&msg(vec![])).unwrap().name(), "fallback");
        assert!(router.is_empty());
    }

    #[test]
    fn test_default_is_tried_after_routes() {
        let router = MessageRouter::new();
        router.set_default(catch_all("fallback"));
        router.register(handler("join", "join"));

        assert_eq!(router.resolve(&tagged("join")).unwrap().name(), "join");
        assert_eq!(router.resolve(&tagged("ic")).unwrap().name(), "fallback");
    }

    #[test]
    fn test_no_match_without_default_is_error() {
        let router = MessageRouter::new();
        router.register(handler("join", "join"));

        let err = router.resolve(&tagged("ping")).err().unwrap();
        assert!(matches!(err, RouterError::NoHandlerMatched(kind) if kind == "ping"));
    }

    #[test]
    fn test_register_with_overrides_matches() {
        let router = MessageRouter::new();
        router.register_with(|m| m.contains("s"), handler("save", "never"));

        let save = msg(vec!["s".into(), "{}".into()]);
        assert_eq!(router.resolve(&save).unwrap().name(), "save");
        assert!(router.resolve(&tagged("never")).is_err());
    }
}
