//! Request context
//!
//! Read-only projection of an inbound request plus the path parameters
//! bound by the router. The body is decoded lazily on demand.

use crate::{Error, Params};
use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

/// Boxed request body as handed to handlers
pub type RequestBody = UnsyncBoxBody<Bytes, Error>;

/// Per-request view handed to handlers
pub struct RequestContext {
    parts: http::request::Parts,
    params: Params,
    // Taken once through `&mut self`; the lock only keeps the context `Sync`
    body: Mutex<Option<RequestBody>>,
    read_timeout: Option<Duration>,
}

impl RequestContext {
    /// Wrap request parts, bound params and the raw body
    pub fn new(parts: http::request::Parts, params: Params, body: RequestBody) -> Self {
        Self {
            parts,
            params,
            body: Mutex::new(Some(body)),
            read_timeout: None,
        }
    }

    /// Give up on reading the body after `timeout`
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Start building a context (mostly useful in tests)
    pub fn builder(method: Method, uri: &str) -> RequestBuilder {
        RequestBuilder::new(method, uri)
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// Request path (without query string)
    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    /// All headers, repeated names preserved
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// First value of a header, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name)?.to_str().ok()
    }

    /// Query string parsed into key -> values
    pub fn query(&self) -> HashMap<String, Vec<String>> {
        parse_query(self.parts.uri.query().unwrap_or_default())
    }

    /// Value bound to a `:name` segment
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Decode the JSON body into `T`.
    ///
    /// The body can be consumed once; malformed, oversized, stalled or
    /// already consumed bodies yield `None` and leave the decision to the
    /// handler.
    pub async fn body<T: DeserializeOwned>(&mut self) -> Option<T> {
        let body = self.body.get_mut().take()?;
        let collected = match self.read_timeout {
            Some(limit) => match tokio::time::timeout(limit, body.collect()).await {
                Ok(collected) => collected,
                Err(_) => {
                    tracing::debug!(timeout_ms = limit.as_millis() as u64, "request body read timed out");
                    return None;
                }
            },
            None => body.collect().await,
        };
        let bytes = match collected {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                tracing::debug!(error = %err, "failed to read request body");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(error = %err, "failed to decode request body");
                None
            }
        }
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.parts.method)
            .field("uri", &self.parts.uri)
            .field("params", &self.params)
            .field("body_consumed", &self.body.lock().is_none())
            .finish()
    }
}

/// Builder for constructing request contexts
pub struct RequestBuilder {
    request: http::request::Builder,
    params: Params,
    body: Bytes,
}

impl RequestBuilder {
    /// Create a new builder
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            request: http::Request::builder().method(method).uri(uri),
            params: Params::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.request = self.request.header(name, value);
        self
    }

    /// Bind a path parameter
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Set body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Build the context
    pub fn build(self) -> crate::Result<RequestContext> {
        let body = if self.body.is_empty() {
            empty_body()
        } else {
            full_body(self.body)
        };
        let (parts, ()) = self
            .request
            .body(())
            .map_err(|e| Error::Internal(e.to_string()))?
            .into_parts();
        Ok(RequestContext::new(parts, self.params, body))
    }
}

fn empty_body() -> RequestBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
}

fn full_body(bytes: Bytes) -> RequestBody {
    Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
}

/// Parse `a=1&b=2&a=3` into key -> values, keeping repeats in order
pub fn parse_query(query: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params
            .entry(percent_decode(key, true))
            .or_default()
            .push(percent_decode(value, true));
    }
    params
}

/// Decode `%XX` escapes in a request path (`+` stays literal)
pub fn decode_path(path: &str) -> String {
    percent_decode(path, false)
}

/// Decode `%XX` escapes, and `+` as space when `plus_as_space` is set;
/// malformed escapes are kept verbatim
fn percent_decode(s: &str, plus_as_space: bool) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                        continue;
                    }
                    _ => out.push(b'%'),
                }
            }
            b'+' if plus_as_space => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
