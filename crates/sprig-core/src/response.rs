//! Response writer
//!
//! Fluent, one-shot response API handed to handlers. Status and headers are
//! recorded until the first write, then flushed exactly once; the body is
//! streamed to the connection through a bounded channel.

use crate::{Error, Result};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use hyper::body::{Body, Frame, SizeHint};
use serde::Serialize;
use smallvec::SmallVec;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Body frames buffered between a handler and its connection
const BODY_CHANNEL_CAPACITY: usize = 16;

/// HTTP Status Code
///
/// Holds any `u16`, including values the wire cannot carry; those are
/// replaced with 500 when headers are flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    // 2xx Success
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const ACCEPTED: StatusCode = StatusCode(202);
    pub const NO_CONTENT: StatusCode = StatusCode(204);

    // 4xx Client Errors
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const CONFLICT: StatusCode = StatusCode(409);
    pub const UNPROCESSABLE_ENTITY: StatusCode = StatusCode(422);

    // 5xx Server Errors
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);

    /// Get the numeric code
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Check if this is a success status (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Check if this is a client error status (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.0)
    }

    /// Check if this is a server error status (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.0)
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

/// Integer literals default to `i32`; out-of-range values become 0
impl From<i32> for StatusCode {
    fn from(code: i32) -> Self {
        StatusCode(u16::try_from(code).unwrap_or(0))
    }
}

/// Parses a decimal status; anything non-numeric becomes 0
impl From<&str> for StatusCode {
    fn from(code: &str) -> Self {
        StatusCode(code.parse().unwrap_or(0))
    }
}

impl From<http::StatusCode> for StatusCode {
    fn from(code: http::StatusCode) -> Self {
        StatusCode(code.as_u16())
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status line and headers, sent once when the writer flushes
#[derive(Debug)]
struct Head {
    status: StatusCode,
    headers: SmallVec<[(String, String); 8]>,
}

impl Head {
    fn into_response(self, body: ResponseBody) -> http::Response<ResponseBody> {
        let mut response = http::Response::new(body);
        *response.status_mut() = http::StatusCode::from_u16(self.status.0).unwrap_or_else(|_| {
            tracing::warn!(status = self.status.0, "invalid status code, sending 500");
            http::StatusCode::INTERNAL_SERVER_ERROR
        });

        let headers = response.headers_mut();
        for (name, value) in self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::warn!(header = %name, "dropping invalid response header"),
            }
        }

        response
    }
}

/// Per-request response writer
///
/// Mutators return `&mut Self` so calls chain:
///
/// ```ignore
/// res.status(201).header("x-request-id", id).json(&user).await?;
/// ```
#[derive(Debug)]
pub struct ResponseWriter {
    status: StatusCode,
    headers: SmallVec<[(String, String); 8]>,
    flushed: bool,
    chunked: bool,
    head_tx: Option<oneshot::Sender<Head>>,
    body_tx: Option<mpsc::Sender<Result<Bytes>>>,
    write_timeout: Option<Duration>,
}

/// Receiving side of a [`ResponseWriter`]
#[derive(Debug)]
pub struct ResponseHandle {
    head_rx: oneshot::Receiver<Head>,
    body_rx: mpsc::Receiver<Result<Bytes>>,
}

impl ResponseWriter {
    /// Create a writer and the handle that turns its output into a response
    pub fn channel() -> (Self, ResponseHandle) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);

        let writer = Self {
            status: StatusCode::OK,
            headers: SmallVec::new(),
            flushed: false,
            chunked: false,
            head_tx: Some(head_tx),
            body_tx: Some(body_tx),
            write_timeout: None,
        };
        (writer, ResponseHandle { head_rx, body_rx })
    }

    /// Fail body writes the connection does not take within `timeout`
    pub fn set_write_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Set the status code; ignored once headers are flushed
    pub fn status(&mut self, code: impl Into<StatusCode>) -> &mut Self {
        if !self.flushed {
            self.status = code.into();
        }
        self
    }

    /// Record a header, replacing an earlier one with the same name;
    /// ignored once headers are flushed
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        if !self.flushed {
            self.set_header(name.into(), value.into());
        }
        self
    }

    /// Serialize `payload` as JSON and write it.
    ///
    /// Serialization happens before anything is flushed, so an error leaves
    /// the response untouched. As the first write, the payload is the whole
    /// body (sent with `content-length`) and later writes fail with
    /// [`Error::ResponseClosed`]. After [`write`](Self::write) it goes out
    /// as one more chunk.
    pub async fn json<T: Serialize + ?Sized>(&mut self, payload: &T) -> Result<()> {
        let body = serde_json::to_vec(payload)?;

        if self.flushed {
            return self.send(Bytes::from(body)).await;
        }

        self.set_header("content-type".to_string(), "application/json".to_string());
        self.set_header("content-length".to_string(), body.len().to_string());
        self.flush_headers();
        let sent = self.send(Bytes::from(body)).await;
        self.body_tx = None;
        sent
    }

    /// Write one chunk of a streamed body.
    ///
    /// The first call switches the response to chunked transfer encoding and
    /// flushes headers. Every non-empty call goes out as exactly one chunk.
    pub async fn write(&mut self, data: impl AsRef<[u8]>) -> Result<&mut Self> {
        if !self.flushed {
            self.chunked = true;
            self.headers
                .retain(|(name, _)| !name.eq_ignore_ascii_case("content-length"));
            self.set_header("transfer-encoding".to_string(), "chunked".to_string());
            self.flush_headers();
        }

        let data = data.as_ref();
        if !data.is_empty() {
            self.send(Bytes::copy_from_slice(data)).await?;
        }
        Ok(self)
    }

    /// Flush headers if needed and close the body.
    ///
    /// A chunked body is terminated with the zero-length chunk.
    pub fn end(&mut self) -> &mut Self {
        self.flush_headers();
        self.body_tx = None;
        self
    }

    /// Whether status and headers have been sent
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Whether the body is sent with chunked transfer encoding
    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Recorded headers in insertion order
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Turn a failed handler into the best response still possible:
    /// a 500 if nothing was sent yet, otherwise an aborted body.
    pub(crate) async fn fail(&mut self) {
        if !self.flushed {
            self.status = StatusCode::INTERNAL_SERVER_ERROR;
            self.headers.clear();
            let body = serde_json::json!({ "error": "Internal Server Error" });
            if let Err(err) = self.json(&body).await {
                tracing::debug!(error = %err, "client went away before error response");
            }
        } else if let Some(tx) = self.body_tx.take() {
            let _ = send_frame(&tx, Err(Error::ResponseAborted), self.write_timeout).await;
        }
        self.end();
    }

    fn set_header(&mut self, name: String, value: String) {
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    fn flush_headers(&mut self) {
        if self.flushed {
            return;
        }
        self.flushed = true;

        if let Some(tx) = self.head_tx.take() {
            let _ = tx.send(Head {
                status: self.status,
                headers: self.headers.clone(),
            });
        }
    }

    async fn send(&mut self, data: Bytes) -> Result<()> {
        let tx = self.body_tx.as_ref().ok_or(Error::ResponseClosed)?;
        send_frame(tx, Ok(data), self.write_timeout).await
    }
}

async fn send_frame(
    tx: &mpsc::Sender<Result<Bytes>>,
    frame: Result<Bytes>,
    timeout: Option<Duration>,
) -> Result<()> {
    let sent = match timeout {
        Some(limit) => tokio::time::timeout(limit, tx.send(frame))
            .await
            .map_err(|_| Error::WriteTimeout)?,
        None => tx.send(frame).await,
    };
    sent.map_err(|_| Error::ResponseClosed)
}

impl ResponseHandle {
    /// Wait for the writer to flush and build the response.
    ///
    /// Resolves as soon as headers are sent; the body keeps streaming. A
    /// writer dropped without flushing yields a 500.
    pub async fn into_response(self) -> http::Response<ResponseBody> {
        match self.head_rx.await {
            Ok(head) => head.into_response(ResponseBody::stream(self.body_rx)),
            Err(_) => {
                tracing::error!("response writer dropped before sending headers");
                plain(
                    http::StatusCode::INTERNAL_SERVER_ERROR,
                    "500 internal server error\n",
                )
            }
        }
    }
}

/// Build a small `text/plain` response
pub(crate) fn plain(status: http::StatusCode, body: &'static str) -> http::Response<ResponseBody> {
    let mut response = http::Response::new(ResponseBody::full(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Body type of every response produced by the dispatcher
#[derive(Debug)]
pub struct ResponseBody {
    kind: Kind,
}

#[derive(Debug)]
enum Kind {
    Full(Option<Bytes>),
    Stream(mpsc::Receiver<Result<Bytes>>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self {
            kind: Kind::Full(None),
        }
    }

    pub fn full(data: impl Into<Bytes>) -> Self {
        Self {
            kind: Kind::Full(Some(data.into())),
        }
    }

    fn stream(rx: mpsc::Receiver<Result<Bytes>>) -> Self {
        Self {
            kind: Kind::Stream(rx),
        }
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<Frame<Bytes>, Error>>> {
        match &mut self.get_mut().kind {
            Kind::Full(data) => Poll::Ready(data.take().map(|bytes| Ok(Frame::data(bytes)))),
            Kind::Stream(rx) => rx
                .poll_recv(cx)
                .map(|item| item.map(|chunk| chunk.map(Frame::data))),
        }
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.kind, Kind::Full(None))
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Full(Some(data)) => SizeHint::with_exact(data.len() as u64),
            Kind::Full(None) => SizeHint::with_exact(0),
            Kind::Stream(_) => SizeHint::default(),
        }
    }
}
