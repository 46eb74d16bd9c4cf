//! Request dispatch
//!
//! Per-request state machine: route lookup, admission, handler invocation,
//! completion. Lookup runs on the percent-decoded path and happens before
//! admission so unroutable requests never hold a slot. The handler runs on its own task together with its permit;
//! the response is handed back to the connection as soon as headers flush.

use crate::request::decode_path;
use crate::response::plain;
use crate::{
    AdmissionGate, Error, RequestBody, RequestContext, ResponseBody, ResponseWriter, RouteTable,
};
use bytes::Bytes;
use futures_util::FutureExt;
use http_body_util::{BodyExt, Limited};
use hyper::body::Body;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Default cap on request bodies read by [`RequestContext::body`]
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Routes requests to handlers under the admission gate
#[derive(Clone)]
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    gate: AdmissionGate,
    max_body_bytes: usize,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(routes: Arc<RouteTable>, gate: AdmissionGate) -> Self {
        Self {
            routes,
            gate,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            read_timeout: None,
            write_timeout: None,
        }
    }

    /// Limit how much of a request body handlers may read
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Bound how long handlers wait on a request body
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Bound how long a response write may wait on the connection
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Run one request through routing, admission and its handler
    pub async fn dispatch<B>(&self, req: http::Request<B>) -> http::Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let path = decode_path(req.uri().path());
        let Some(route) = self.routes.lookup(req.method().as_str(), &path) else {
            tracing::debug!(method = %req.method(), %path, "no route matched");
            return plain(http::StatusCode::NOT_FOUND, "404 page not found\n");
        };

        let permit = match self.gate.acquire().await {
            Ok(permit) => permit,
            Err(err) => {
                tracing::warn!(error = %err, "request rejected");
                return plain(
                    http::StatusCode::SERVICE_UNAVAILABLE,
                    "503 service unavailable\n",
                );
            }
        };

        let method = req.method().clone();
        let (parts, body) = req.into_parts();
        let body: RequestBody = Limited::new(body, self.max_body_bytes)
            .map_err(|err| Error::Body(err.to_string()))
            .boxed_unsync();
        let mut ctx = RequestContext::new(parts, route.params, body);
        if let Some(timeout) = self.read_timeout {
            ctx = ctx.with_read_timeout(timeout);
        }
        let (mut writer, handle) = ResponseWriter::channel();
        if let Some(timeout) = self.write_timeout {
            writer.set_write_timeout(timeout);
        }
        let handler = route.handler;

        tokio::spawn(async move {
            let _permit = permit;
            let outcome = AssertUnwindSafe(handler(ctx, &mut writer))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {
                    writer.end();
                }
                Ok(Err(err)) => {
                    tracing::error!(%method, %path, error = %err, "handler failed");
                    writer.fail().await;
                }
                Err(panic) => {
                    tracing::error!(
                        %method,
                        %path,
                        panic = panic_message(&*panic),
                        "handler panicked"
                    );
                    writer.fail().await;
                }
            }
        });

        handle.into_response().await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
