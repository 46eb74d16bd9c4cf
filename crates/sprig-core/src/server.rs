//! Native HTTP server implementation
//!
//! hyper 1.x on a multi-threaded tokio runtime with:
//! - One task per connection, one task per admitted handler
//! - SO_REUSEADDR and TCP_NODELAY on the listening socket
//! - Read, write and idle timeouts on every connection
//! - Graceful shutdown bounded by a grace period

use crate::dispatch::{Dispatcher, DEFAULT_MAX_BODY_BYTES};
use crate::gate::default_capacity;
use crate::io::TimeoutIo;
use crate::router::{handler, HandlerFuture};
use crate::{AdmissionGate, Error, RequestContext, ResponseWriter, Result, RouteTable};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use socket2::{Domain, Protocol, Socket, Type};
use std::convert::Infallible;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

/// Pause between drain checks during shutdown
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Pause after a failed accept (e.g. file descriptor exhaustion)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Listen backlog
const BACKLOG: i32 = 1024;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IP address to bind (no DNS resolution)
    pub hostname: String,
    pub port: u16,
    /// Admission gate capacity
    pub max_in_flight: usize,
    /// How long shutdown waits for in-flight work
    pub shutdown_grace: Duration,
    /// Deadline for a client to finish sending request headers
    pub header_read_timeout: Duration,
    /// Deadline for a handler to receive the request body
    pub read_timeout: Duration,
    /// How long a response write may wait on a client that is not reading
    pub write_timeout: Duration,
    /// How long a connection may go without receiving a byte
    pub idle_timeout: Duration,
    /// Largest request body `RequestContext::body` will read
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            port: 8000,
            max_in_flight: default_capacity(),
            shutdown_grace: Duration::from_secs(5),
            header_read_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(15),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    /// Address to bind
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .hostname
            .parse()
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", self.hostname, e)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// How a shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every connection and handler finished within the grace period
    Drained,
    /// Grace period elapsed; the remaining work was abandoned
    TimedOut { connections: u64, handlers: usize },
}

impl ShutdownOutcome {
    pub fn is_drained(&self) -> bool {
        matches!(self, ShutdownOutcome::Drained)
    }
}

/// Create a TCP socket with optimizations
pub fn create_optimized_socket(addr: &SocketAddr) -> std::io::Result<Socket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // SO_REUSEADDR - allow binding to address in TIME_WAIT
    socket.set_reuse_address(true)?;

    // TCP_NODELAY - disable Nagle's algorithm for lower latency
    socket.set_nodelay(true)?;

    socket.set_nonblocking(true)?;
    socket.bind(&(*addr).into())?;
    socket.listen(BACKLOG)?;

    Ok(socket)
}

/// Counts active connections so shutdown can wait for them to drain
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    /// Active connection count
    active: AtomicU64,
}

/// Keeps one connection counted until dropped
#[derive(Debug)]
pub struct ConnectionGuard {
    tracker: Arc<ConnectionTracker>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.tracker.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConnectionTracker {
    /// Create a new connection tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a connection until the returned guard is dropped
    pub fn track(self: &Arc<Self>) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            tracker: self.clone(),
        }
    }

    /// Get current active connection count
    #[inline]
    pub fn count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }
}

/// HTTP server: route registration plus listener lifecycle
pub struct Server {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    tracker: Arc<ConnectionTracker>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let dispatcher = Dispatcher::new(
            Arc::new(RouteTable::new()),
            AdmissionGate::new(config.max_in_flight),
        )
        .with_max_body_bytes(config.max_body_bytes)
        .with_read_timeout(config.read_timeout)
        .with_write_timeout(config.write_timeout);

        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            tracker: Arc::new(ConnectionTracker::new()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn routes(&self) -> &RouteTable {
        self.dispatcher.routes()
    }

    pub fn gate(&self) -> &AdmissionGate {
        self.dispatcher.gate()
    }

    /// Register a handler for `method` and `pattern`
    pub fn route<F>(&self, method: &str, pattern: &str, f: F) -> &Self
    where
        F: for<'a> Fn(RequestContext, &'a mut ResponseWriter) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.routes().register(method, pattern, handler(f));
        self
    }

    /// Add a GET route
    pub fn get<F>(&self, pattern: &str, f: F) -> &Self
    where
        F: for<'a> Fn(RequestContext, &'a mut ResponseWriter) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.route("GET", pattern, f)
    }

    /// Add a POST route
    pub fn post<F>(&self, pattern: &str, f: F) -> &Self
    where
        F: for<'a> Fn(RequestContext, &'a mut ResponseWriter) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.route("POST", pattern, f)
    }

    /// Add a PUT route
    pub fn put<F>(&self, pattern: &str, f: F) -> &Self
    where
        F: for<'a> Fn(RequestContext, &'a mut ResponseWriter) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.route("PUT", pattern, f)
    }

    /// Add a DELETE route
    pub fn delete<F>(&self, pattern: &str, f: F) -> &Self
    where
        F: for<'a> Fn(RequestContext, &'a mut ResponseWriter) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.route("DELETE", pattern, f)
    }

    /// Add the same handler for GET, POST, PUT and DELETE
    pub fn any<F>(&self, pattern: &str, f: F) -> &Self
    where
        F: for<'a> Fn(RequestContext, &'a mut ResponseWriter) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.routes().register_any(pattern, handler(f));
        self
    }

    /// Get the number of active connections
    pub fn active_connections(&self) -> u64 {
        self.tracker.count()
    }

    /// Bind the configured address. Must be called inside a tokio runtime.
    pub fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.socket_addr()?;
        let socket = create_optimized_socket(&addr).map_err(|source| Error::Bind { addr, source })?;
        TcpListener::from_std(socket.into()).map_err(|source| Error::Bind { addr, source })
    }

    /// Bind, serve until `shutdown` resolves, then drain.
    ///
    /// A bind failure is fatal and returned without serving.
    pub async fn run<S>(&self, shutdown: S) -> Result<ShutdownOutcome>
    where
        S: Future<Output = ()>,
    {
        let listener = match self.bind() {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(error = %err, "server failed to start");
                return Err(err);
            }
        };
        self.serve(listener, shutdown).await
    }

    /// Accept connections on `listener` until `shutdown` resolves.
    ///
    /// Then stops accepting, asks open connections to finish their current
    /// exchange, and waits up to `shutdown_grace` for connections and
    /// handlers to drain.
    pub async fn serve<S>(&self, listener: TcpListener, shutdown: S) -> Result<ShutdownOutcome>
    where
        S: Future<Output = ()>,
    {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            address = %local_addr,
            max_in_flight = self.gate().capacity(),
            "server listening"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer, shutdown_rx.clone()),
                    Err(err) => {
                        tracing::warn!(error = %err, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        // Reject new connections during shutdown
        drop(listener);
        let _ = shutdown_tx.send(());
        tracing::info!(
            connections = self.tracker.count(),
            handlers = self.gate().in_flight(),
            grace_ms = self.config.shutdown_grace.as_millis() as u64,
            "shutting down, draining in-flight requests"
        );

        Ok(self.drain().await)
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr, mut shutdown: watch::Receiver<()>) {
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %err, "failed to set TCP_NODELAY");
        }

        let guard = self.tracker.track();
        let dispatcher = self.dispatcher.clone();
        let header_read_timeout = self.config.header_read_timeout;
        let idle_timeout = self.config.idle_timeout;
        let write_timeout = self.config.write_timeout;

        tokio::spawn(async move {
            let _guard = guard;
            let io = TokioIo::new(TimeoutIo::new(stream, idle_timeout, write_timeout));
            let service = service_fn(move |req| {
                let dispatcher = dispatcher.clone();
                async move { Ok::<_, Infallible>(dispatcher.dispatch(req).await) }
            });

            let conn = http1::Builder::new()
                .timer(TokioTimer::new())
                .header_read_timeout(header_read_timeout)
                .serve_connection(io, service);
            tokio::pin!(conn);

            let mut draining = false;
            loop {
                tokio::select! {
                    result = conn.as_mut() => {
                        if let Err(err) = result {
                            // Only log if not a normal connection close
                            if is_quiet_close(&err) {
                                tracing::debug!(%peer, error = %err, "connection closed early");
                            } else {
                                tracing::warn!(%peer, error = %err, "connection error");
                            }
                        }
                        break;
                    }
                    _ = shutdown.changed(), if !draining => {
                        draining = true;
                        conn.as_mut().graceful_shutdown();
                    }
                }
            }
        });
    }

    async fn drain(&self) -> ShutdownOutcome {
        let grace = self.config.shutdown_grace;
        let deadline = tokio::time::Instant::now() + grace;

        loop {
            let connections = self.tracker.count();
            let handlers = self.gate().in_flight();
            if connections == 0 && handlers == 0 {
                tracing::info!("all in-flight requests drained");
                return ShutdownOutcome::Drained;
            }

            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    connections,
                    handlers,
                    grace_ms = grace.as_millis() as u64,
                    "grace period elapsed, abandoning in-flight requests"
                );
                return ShutdownOutcome::TimedOut {
                    connections,
                    handlers,
                };
            }

            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}

/// Client hang-ups and expired deadlines are routine, not faults
fn is_quiet_close(err: &hyper::Error) -> bool {
    if err.is_incomplete_message() || err.is_closed() || err.is_timeout() {
        return true;
    }
    std::error::Error::source(err)
        .and_then(|source| source.downcast_ref::<std::io::Error>())
        .is_some_and(|io| io.kind() == std::io::ErrorKind::TimedOut)
}

impl Default for Server {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatusCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    fn test_config() -> ServerConfig {
        ServerConfig {
            hostname: "127.0.0.1".to_string(),
            port: 0,
            max_in_flight: 8,
            shutdown_grace: Duration::from_millis(500),
            ..ServerConfig::default()
        }
    }

    type Running = (
        SocketAddr,
        oneshot::Sender<()>,
        tokio::task::JoinHandle<Result<ShutdownOutcome>>,
    );

    /// Start serving on an ephemeral port; returns the address, the
    /// shutdown trigger and the serve task
    fn start(server: Server) -> Running {
        start_shared(Arc::new(server))
    }

    fn start_shared(server: Arc<Server>) -> Running {
        let listener = server.bind().unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
        });
        (addr, tx, task)
    }

    async fn send_raw(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn get(path: &str) -> String {
        format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
    }

    /// Split a chunked body into its chunks; sizes are hex in either case
    fn decode_chunks(mut body: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        loop {
            let (size, rest) = body.split_once("\r\n").unwrap();
            let size = usize::from_str_radix(size, 16).unwrap();
            if size == 0 {
                assert_eq!(rest, "\r\n", "trailing data after last chunk");
                return chunks;
            }
            chunks.push(rest[..size].to_string());
            assert_eq!(&rest[size..size + 2], "\r\n");
            body = &rest[size + 2..];
        }
    }

    async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(3), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
    }

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.idle_timeout, Duration::from_secs(15));
        assert_eq!(config.max_in_flight, num_cpus::get() * 100);
        assert_eq!(
            config.socket_addr().unwrap(),
            "0.0.0.0:8000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_invalid_hostname() {
        let config = ServerConfig {
            hostname: "not an ip".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(config.socket_addr(), Err(Error::InvalidAddress(_))));
    }

    #[test]
    fn test_connection_tracker() {
        let tracker = Arc::new(ConnectionTracker::new());
        let a = tracker.track();
        let b = tracker.track();
        assert_eq!(tracker.count(), 2);
        drop(a);
        assert_eq!(tracker.count(), 1);
        drop(b);
        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        // A listening socket on the port makes the bind fail
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();
        let server = Server::new(ServerConfig {
            port,
            ..test_config()
        });

        let result = server.run(std::future::pending()).await;
        assert!(matches!(result, Err(Error::Bind { .. })));
    }

    #[tokio::test]
    async fn test_serves_json_and_404() {
        let server = Server::new(test_config());
        server.get("/hello/:name", |req, res| {
            Box::pin(async move {
                let name = req.path_param("name").unwrap_or_default().to_string();
                res.status(StatusCode::OK)
                    .json(&serde_json::json!({ "hello": name }))
                    .await
            })
        });

        let (addr, shutdown, task) = start(server);

        let response = send_raw(addr, &get("/hello/world")).await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        assert!(response.contains("content-type: application/json\r\n"));
        assert!(response.ends_with("\r\n\r\n{\"hello\":\"world\"}"));

        let response = send_raw(addr, &get("/nope")).await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"), "{response}");
        assert!(response.ends_with("404 page not found\n"));

        shutdown.send(()).unwrap();
        assert_eq!(task.await.unwrap().unwrap(), ShutdownOutcome::Drained);
    }

    #[tokio::test]
    async fn test_chunked_wire_framing() {
        let server = Server::new(test_config());
        server.get("/stream", |_req, res| {
            Box::pin(async move {
                res.write("hello").await?.write("").await?;
                res.write(vec![b'x'; 26]).await?;
                res.end();
                Ok(())
            })
        });

        let (addr, shutdown, task) = start(server);
        let response = send_raw(addr, &get("/stream")).await;

        assert!(response.contains("transfer-encoding: chunked\r\n"), "{response}");
        let body = response.split_once("\r\n\r\n").unwrap().1;
        assert!(body.starts_with("5\r\nhello\r\n"), "{body:?}");
        assert!(body.ends_with("\r\n0\r\n\r\n"), "{body:?}");
        assert_eq!(decode_chunks(body), ["hello".to_string(), "x".repeat(26)]);

        shutdown.send(()).unwrap();
        assert!(task.await.unwrap().unwrap().is_drained());
    }

    #[tokio::test]
    async fn test_stalled_body_releases_slot() {
        let server = Arc::new(Server::new(ServerConfig {
            max_in_flight: 1,
            read_timeout: Duration::from_millis(200),
            ..test_config()
        }));
        server.post("/echo", |mut req, res| {
            Box::pin(async move {
                match req.body::<serde_json::Value>().await {
                    Some(value) => res.json(&value).await,
                    None => res.status(StatusCode::BAD_REQUEST).json("invalid body").await,
                }
            })
        });
        let (addr, shutdown, task) = start_shared(server.clone());

        // Promise 100 bytes, send one, then go quiet
        let mut stalled = TcpStream::connect(addr).await.unwrap();
        stalled
            .write_all(b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 100\r\n\r\n{")
            .await
            .unwrap();

        let mut received = Vec::new();
        tokio::time::timeout(Duration::from_secs(3), async {
            let mut buf = [0u8; 512];
            while !String::from_utf8_lossy(&received).contains("\"invalid body\"") {
                let n = stalled.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before a response");
                received.extend_from_slice(&buf[..n]);
            }
        })
        .await
        .expect("stalled body was never cut off");
        assert!(received.starts_with(b"HTTP/1.1 400"));

        let gate = server.gate().clone();
        wait_until("the slot to be released", || gate.in_flight() == 0).await;

        // The single slot serves the next request
        let body = r#"{"ok":true}"#;
        let request = format!(
            "POST /echo HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let response = send_raw(addr, &request).await;
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.ends_with(body));

        drop(stalled);
        shutdown.send(()).unwrap();
        assert!(task.await.unwrap().unwrap().is_drained());
    }

    #[tokio::test]
    async fn test_idle_connection_is_dropped() {
        let server = Arc::new(Server::new(ServerConfig {
            idle_timeout: Duration::from_millis(200),
            ..test_config()
        }));
        let (addr, shutdown, task) = start_shared(server.clone());

        let mut idle = TcpStream::connect(addr).await.unwrap();
        let mut buf = Vec::new();
        let closed = tokio::time::timeout(Duration::from_secs(3), idle.read_to_end(&mut buf)).await;
        assert!(closed.is_ok(), "idle connection was kept open");

        wait_until("the connection to be released", || {
            server.active_connections() == 0
        })
        .await;

        shutdown.send(()).unwrap();
        assert!(task.await.unwrap().unwrap().is_drained());
    }

    #[tokio::test]
    async fn test_route_registered_while_serving() {
        let server = Arc::new(Server::new(test_config()));
        let listener = server.bind().unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let serving = server.clone();
        let task = tokio::spawn(async move {
            serving
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
        });

        assert!(send_raw(addr, &get("/late")).await.starts_with("HTTP/1.1 404"));

        server.get("/late", |_req, res| {
            Box::pin(async move { res.status(202).json("ok").await })
        });
        assert!(send_raw(addr, &get("/late")).await.starts_with("HTTP/1.1 202"));

        tx.send(()).unwrap();
        assert!(task.await.unwrap().unwrap().is_drained());
    }

    #[tokio::test]
    async fn test_graceful_shutdown_waits_for_in_flight() {
        let server = Server::new(test_config());
        let (entered_tx, entered_rx) = oneshot::channel::<()>();
        let entered = Arc::new(parking_lot::Mutex::new(Some(entered_tx)));
        server.get("/slow", move |_req, res| {
            let entered = entered.clone();
            Box::pin(async move {
                if let Some(tx) = entered.lock().take() {
                    let _ = tx.send(());
                }
                tokio::time::sleep(Duration::from_millis(150)).await;
                res.json("done").await
            })
        });

        let (addr, shutdown, task) = start(server);
        let client = tokio::spawn(async move { send_raw(addr, &get("/slow")).await });

        entered_rx.await.unwrap();
        shutdown.send(()).unwrap();

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, ShutdownOutcome::Drained);

        let response = client.await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.ends_with("\"done\""));

        // Listener is gone after shutdown
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_abandons_after_grace() {
        let server = Server::new(ServerConfig {
            shutdown_grace: Duration::from_millis(100),
            ..test_config()
        });
        let (entered_tx, entered_rx) = oneshot::channel::<()>();
        let entered = Arc::new(parking_lot::Mutex::new(Some(entered_tx)));
        server.get("/stuck", move |_req, res| {
            let entered = entered.clone();
            Box::pin(async move {
                if let Some(tx) = entered.lock().take() {
                    let _ = tx.send(());
                }
                tokio::time::sleep(Duration::from_secs(30)).await;
                res.json("too late").await
            })
        });

        let (addr, shutdown, task) = start(server);
        let _client = tokio::spawn(async move { send_raw(addr, &get("/stuck")).await });

        entered_rx.await.unwrap();
        let started = tokio::time::Instant::now();
        shutdown.send(()).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("serve did not return after the grace period")
            .unwrap()
            .unwrap();
        assert_eq!(
            outcome,
            ShutdownOutcome::TimedOut {
                connections: 1,
                handlers: 1
            }
        );
        assert!(started.elapsed() >= Duration::from_millis(100));
    }
}
