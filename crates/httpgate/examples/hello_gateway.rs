//! Minimal wiring: an accept loop handing TCP connections to a frontend
//! backed by a fixed-response backend.
//!
//! ```text
//! HTTPGATE_BIND=127.0.0.1:8080 HTTPGATE_METRICS_BIND=127.0.0.1:9100 \
//!     cargo run --example hello_gateway
//! ```

use std::env;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use httpgate::{
    BackendHandle, FeConn, FrontendOptions, HttpBackend, HttpFrontend, RequestDescriptor, Route,
    ServeError,
};
use tokio::net::TcpListener;
use tokio::sync::watch;

struct HelloBackend;

impl HttpBackend for HelloBackend {
    fn name(&self) -> &str {
        "hello"
    }

    fn serve<'a>(
        &'a self,
        desc: &'a mut RequestDescriptor,
        conn: &'a mut FeConn,
    ) -> Pin<Box<dyn Future<Output = Result<(), ServeError>> + Send + 'a>> {
        Box::pin(async move {
            desc.backend_name = "hello".to_string();
            desc.backend_server = "hello-1".to_string();
            desc.backend_status_code = "200".to_string();
            let body = format!("hello from {}\n", desc.uri);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: text/plain\r\n\r\n{}",
                body.len(),
                body
            );
            conn.write(response.as_bytes());
            conn.flush().await.map_err(|cause| {
                let message = format!("write response: {cause}");
                ServeError::Http(httpgate::HttpError {
                    group: httpgate::ErrorGroup::Communication,
                    message,
                    cause: Some(cause),
                })
            })?;
            Ok(())
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bind = env::var("HTTPGATE_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let metrics_bind =
        env::var("HTTPGATE_METRICS_BIND").unwrap_or_else(|_| "127.0.0.1:9100".to_string());
    let metrics_addr: SocketAddr = metrics_bind.parse()?;
    httpgate::observe::init("gateway", metrics_addr)?;

    let backend: BackendHandle = Arc::new(HelloBackend);
    let mut opts = FrontendOptions::new("hello", backend.clone());
    opts.keep_alive_timeout = Duration::from_secs(30);
    opts.timeout = Duration::from_secs(10);
    opts.routes.push(Route::new("*", "/hello/*", backend));
    let frontend = Arc::new(HttpFrontend::new(opts)?);

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = TcpListener::bind(&bind).await?;
    println!("listening on {bind}, metrics on {metrics_bind}");

    loop {
        let (stream, _) = listener.accept().await?;
        let frontend = Arc::clone(&frontend);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            frontend.serve_connection(stream, shutdown).await;
        });
    }
}
