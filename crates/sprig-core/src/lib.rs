//! sprig-core: small HTTP routing core
//!
//! Routes requests by method and `:param` path pattern to async handlers,
//! bounds handler concurrency with an admission gate, and exposes a
//! request/response façade over hyper.
//!
//! ## Layout
//! - [`router`] - thread-safe route table over `sprig-router`
//! - [`gate`] - admission control (bounded in-flight handlers)
//! - [`request`] / [`response`] - handler-facing façade
//! - [`dispatch`] - per-request lookup, admission, invocation
//! - [`server`] - listener, connection tasks, graceful drain
//! - [`io`] - per-connection idle and write deadlines
//! - [`lifecycle`] - OS signal handling
//!
//! ```no_run
//! use sprig_core::{Server, ServerConfig};
//!
//! # async fn demo() -> sprig_core::Result<()> {
//! let server = Server::new(ServerConfig::default());
//! server.get("/hello/:name", |req, res| {
//!     Box::pin(async move {
//!         let name = req.path_param("name").unwrap_or("world").to_string();
//!         res.json(&format!("hello {name}")).await
//!     })
//! });
//! server.run(sprig_core::lifecycle::shutdown_signal()).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod dispatch;
pub mod error;
pub mod gate;
pub mod io;
pub mod lifecycle;
pub mod request;
pub mod response;
pub mod router;
pub mod server;

// Re-exports
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use gate::{AdmissionGate, AdmissionPermit};
pub use request::{RequestBody, RequestBuilder, RequestContext};
pub use response::{ResponseBody, ResponseHandle, ResponseWriter, StatusCode};
pub use router::{handler, Handler, HandlerFuture, RouteMatch, RouteTable};
pub use server::{ConnectionTracker, Server, ServerConfig, ShutdownOutcome};

pub use sprig_router::{match_path, Params, Pattern};
