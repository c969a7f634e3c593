use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::{Duration, Instant};

use gate_observe::{FrontendMetrics, RequestLabels};
use gate_route::RouteTable;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{BackendHandle, FrontendError, FrontendOptions};
use crate::conn::FeConn;
use crate::error::{HttpError, ServeError};
use crate::header::{split_http_header, uri_to_path, Headers};

const WORKER_TICK: Duration = Duration::from_millis(100);
const TCP_KEEPALIVE_PERIOD: Duration = Duration::from_secs(1);

const HTTP_BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n";
const HTTP_FORBIDDEN: &[u8] = b"HTTP/1.1 403 Forbidden\r\nConnection: close\r\n\r\n";

/// Scratch state for one in-flight request. Created fresh per request,
/// filled by the pipeline and the backend it dispatches to, read once for
/// telemetry, then discarded.
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    pub frontend: String,
    pub remote_addr: Option<SocketAddr>,
    pub status_line: String,
    pub method: String,
    pub uri: String,
    pub version: String,
    pub headers: Headers,
    /// Host pattern string of the matched route (`*` for the default).
    pub matched_host: String,
    /// Path pattern string of the matched route (`*` for the default).
    pub matched_path: String,
    pub backend_name: String,
    pub backend_server: String,
    /// Status code as written to the client; string-typed, it is a label.
    pub backend_status_code: String,
}

/// Upstream dispatch contract. An implementation reads the remaining
/// request body from `conn`, relays the request upstream, writes the
/// response back through `conn` and flushes it, and fills
/// `desc.backend_name`, `desc.backend_server`, and
/// `desc.backend_status_code`. `ExpectedEof` reports a clean upstream
/// close after a complete response; `GracefulTermination` ends the
/// connection without error accounting; `Http` errors propagate unchanged.
pub trait HttpBackend: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn serve<'a>(
        &'a self,
        desc: &'a mut RequestDescriptor,
        conn: &'a mut FeConn,
    ) -> Pin<Box<dyn Future<Output = Result<(), ServeError>> + Send + 'a>>;
}

/// The accept-side component: owns the compiled route table, the curried
/// metric emitters, and a background worker. Immutable once constructed;
/// reconfiguration goes through [`HttpFrontend::fork`].
pub struct HttpFrontend {
    opts: FrontendOptions,
    routes: RouteTable<BackendHandle>,
    metrics: FrontendMetrics,
    worker_shutdown: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl HttpFrontend {
    /// Validates the options, compiles the route table, and spawns the
    /// worker. Requires a running Tokio runtime.
    pub fn new(opts: FrontendOptions) -> Result<Self, FrontendError> {
        opts.validate()?;
        let routes = RouteTable::compile(&opts.routes, opts.default_backend.clone())?;
        let metrics = FrontendMetrics::new(&opts.name);
        let (worker_shutdown, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(worker(shutdown_rx));
        Ok(Self {
            opts,
            routes,
            metrics,
            worker_shutdown,
            worker: Some(worker),
        })
    }

    /// A new, independent frontend serving `opts`. `self` keeps serving
    /// its own configuration.
    pub fn fork(&self, opts: FrontendOptions) -> Result<Self, FrontendError> {
        Self::new(opts)
    }

    pub fn name(&self) -> &str {
        &self.opts.name
    }

    /// A copy of the active options. The copy shares backend handles but
    /// no compiled state; modifying it does not affect this frontend.
    pub fn get_opts(&self) -> FrontendOptions {
        self.opts.clone()
    }

    /// Stops the worker and joins it.
    pub async fn close(&mut self) {
        let _ = self.worker_shutdown.send(true);
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    /// Owns one TCP connection from accept until final close, serving
    /// successive keep-alive requests. `shutdown` ends the idle wait; an
    /// in-flight request treats it like a deadline expiry.
    pub async fn serve_connection(&self, stream: TcpStream, mut shutdown: watch::Receiver<bool>) {
        configure_socket(&stream);
        let mut conn = FeConn::new(stream);
        self.serve_buffered(&mut conn, &mut shutdown).await;
    }

    /// As [`HttpFrontend::serve_connection`], over an already wrapped
    /// connection.
    pub async fn serve_buffered(&self, conn: &mut FeConn, shutdown: &mut watch::Receiver<bool>) {
        let address = conn.local_addr().to_string();

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.metrics.incr_idle_connections(&address);
            let waited = tokio::select! {
                peeked = conn.peek() => match peeked {
                    Ok(_) => IdleWait::Ready,
                    Err(_) => IdleWait::Closed,
                },
                () = deadline(self.opts.keep_alive_timeout) => IdleWait::Deadline,
                _ = shutdown.changed() => IdleWait::Shutdown,
            };
            self.metrics.decr_idle_connections(&address);

            match waited {
                IdleWait::Ready => {
                    self.metrics.incr_active_connections(&address);
                    let mut desc = RequestDescriptor {
                        remote_addr: conn.peer_addr(),
                        ..RequestDescriptor::default()
                    };
                    let result = self.serve(conn, &mut desc, shutdown).await;
                    self.metrics.decr_active_connections(&address);
                    if result.is_err() {
                        break;
                    }
                }
                IdleWait::Closed | IdleWait::Deadline | IdleWait::Shutdown => break,
            }
        }
    }

    /// One request: parse, route, dispatch, and account, raced against the
    /// request deadline. `requests_total` is incremented exactly once per
    /// invocation, timeout path included.
    async fn serve(
        &self,
        conn: &mut FeConn,
        desc: &mut RequestDescriptor,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ServeError> {
        desc.frontend = self.opts.name.clone();
        let started = Instant::now();

        let raced = tokio::select! {
            result = self.drive_request(conn, desc) => Raced::Finished(result),
            () = deadline(self.opts.timeout) => Raced::DeadlineExpired,
            _ = shutdown.changed() => Raced::DeadlineExpired,
        };

        let result = match raced {
            Raced::Finished(result) => {
                if result.is_err() {
                    let _ = conn.flush().await;
                    conn.close().await;
                }
                result
            }
            Raced::DeadlineExpired => {
                let _ = conn.flush().await;
                conn.close().await;
                let error = HttpError::frontend_timeout(format!(
                    "timeout exceeded on listener {:?} on frontend {:?}",
                    conn.local_addr(),
                    self.opts.name,
                ));
                error.emit_debug_log();
                Err(ServeError::Http(error))
            }
        };

        let stats = conn.take_delta();
        let labels = RequestLabels {
            address: conn.local_addr().to_string(),
            host: desc.matched_host.clone(),
            path: desc.matched_path.clone(),
            method: desc.method.clone(),
            backend: desc.backend_name.clone(),
            server: desc.backend_server.clone(),
            code: desc.backend_status_code.clone(),
        };
        self.metrics.record_read_bytes(&labels, stats.bytes_read);
        self.metrics.record_write_bytes(&labels, stats.bytes_written);
        match &result {
            Ok(()) | Err(ServeError::GracefulTermination) | Err(ServeError::ExpectedEof) => {
                self.metrics.record_request(&labels, "");
                self.metrics
                    .observe_request_duration(&labels, started.elapsed().as_secs_f64());
            }
            Err(error) => {
                self.metrics.record_request(&labels, error.error_label());
            }
        }

        result
    }

    async fn drive_request(
        &self,
        conn: &mut FeConn,
        desc: &mut RequestDescriptor,
    ) -> Result<(), ServeError> {
        let header = match split_http_header(conn, self.opts.max_header_bytes).await {
            Ok(Some(header)) => header,
            Ok(None) => return Err(ServeError::GracefulTermination),
            Err(cause) => {
                let error = HttpError::communication(
                    format!(
                        "read header from listener {:?} on frontend {:?}: {}",
                        conn.local_addr(),
                        self.opts.name,
                        cause,
                    ),
                    cause,
                );
                error.emit_debug_log();
                conn.write(HTTP_BAD_REQUEST);
                return Err(error.into());
            }
        };
        desc.status_line = header.status_line;
        desc.headers = header.headers;

        let (method, uri, version) = {
            let mut parts = desc.status_line.splitn(3, ' ');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(method), Some(uri), Some(version)) => {
                    (method.to_uppercase(), uri.to_string(), version.to_uppercase())
                }
                _ => {
                    let error = HttpError::protocol(format!(
                        "status line format error from listener {:?} on frontend {:?}",
                        conn.local_addr(),
                        self.opts.name,
                    ));
                    error.emit_debug_log();
                    return Err(error.into());
                }
            }
        };
        desc.method = method;
        desc.uri = uri;
        desc.version = version;
        if desc.version != "HTTP/1.0" && desc.version != "HTTP/1.1" {
            let error = HttpError::protocol(format!(
                "HTTP version error from listener {:?} on frontend {:?}",
                conn.local_addr(),
                self.opts.name,
            ));
            error.emit_debug_log();
            return Err(error.into());
        }

        let host = desc.headers.get("Host").unwrap_or_default().to_lowercase();
        let path = uri_to_path(&desc.uri).to_lowercase();
        let matched = self.routes.find(&host, &path, desc.remote_addr);
        desc.matched_host = matched.host.to_string();
        desc.matched_path = matched.path.to_string();
        let Some(backend) = matched.backend else {
            conn.write(HTTP_FORBIDDEN);
            return Err(ServeError::GracefulTermination);
        };

        backend.serve(desc, conn).await?;

        // The client started a new request before its prior body was fully
        // consumed.
        if conn.buffered() != 0 {
            let error = HttpError::protocol(format!(
                "buffer order error on listener {:?} on frontend {:?}",
                conn.local_addr(),
                self.opts.name,
            ));
            error.emit_debug_log();
            return Err(error.into());
        }

        Ok(())
    }
}

enum IdleWait {
    Ready,
    Closed,
    Deadline,
    Shutdown,
}

enum Raced {
    Finished(Result<(), ServeError>),
    DeadlineExpired,
}

/// Pending forever when the timeout is zero (unlimited).
async fn deadline(timeout: Duration) {
    if timeout.is_zero() {
        std::future::pending::<()>().await
    } else {
        tokio::time::sleep(timeout).await
    }
}

async fn worker(mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(WORKER_TICK);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
    }
}

fn configure_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
    let keepalive = TcpKeepalive::new()
        .with_time(TCP_KEEPALIVE_PERIOD)
        .with_interval(TCP_KEEPALIVE_PERIOD);
    if let Err(error) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
        tracing::debug!(%error, "failed to enable TCP keepalive");
    }
}
