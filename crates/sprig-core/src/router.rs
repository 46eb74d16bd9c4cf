//! Route table
//!
//! Thread-safe wrapper around [`sprig_router::Router`] holding boxed async
//! handlers. Registration takes the write lock, lookups share the read lock,
//! so routes may be added while traffic is flowing.

use crate::{Params, RequestContext, ResponseWriter, Result};
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use sprig_router::Router;
use std::sync::Arc;

/// Methods covered by [`RouteTable::register_any`]
pub const ANY_METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];

/// Future returned by a handler
pub type HandlerFuture<'a> = BoxFuture<'a, Result<()>>;

/// Type-erased request handler
pub type Handler =
    Arc<dyn for<'a> Fn(RequestContext, &'a mut ResponseWriter) -> HandlerFuture<'a> + Send + Sync>;

/// Lookup result: the handler to run and the parameters it sees
#[derive(Clone)]
pub struct RouteMatch {
    pub handler: Handler,
    pub params: Params,
}

impl std::fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteMatch")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Method-keyed, registration-ordered route registry
#[derive(Default)]
pub struct RouteTable {
    router: RwLock<Router<Handler>>,
}

impl RouteTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route; earlier registrations keep priority
    pub fn register(&self, method: &str, pattern: &str, handler: Handler) {
        tracing::debug!(method, pattern, "route registered");
        self.router.write().insert(method, pattern, handler);
    }

    /// Register the same handler under GET, POST, PUT and DELETE
    pub fn register_any(&self, pattern: &str, handler: Handler) {
        let mut router = self.router.write();
        for method in ANY_METHODS {
            router.insert(method, pattern, handler.clone());
        }
    }

    /// First route for `method` whose pattern matches `path`
    pub fn lookup(&self, method: &str, path: &str) -> Option<RouteMatch> {
        self.router.read().find(method, path).map(|matched| RouteMatch {
            handler: matched.handler.clone(),
            params: matched.params,
        })
    }

    /// Check if a method has any routes registered
    pub fn has_method(&self, method: &str) -> bool {
        self.router.read().has_method(method)
    }

    /// Get all registered methods
    pub fn methods(&self) -> Vec<String> {
        self.router.read().methods()
    }

    pub fn len(&self) -> usize {
        self.router.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.router.read().is_empty()
    }
}

/// Erase a concrete handler closure into a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: for<'a> Fn(RequestContext, &'a mut ResponseWriter) -> HandlerFuture<'a>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}
