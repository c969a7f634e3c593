//! Telemetry for the HTTP frontend.
//!
//! Emission goes through the `metrics` facade; [`init`] installs the
//! process-wide Prometheus exporter with the frontend's histogram bucket
//! layout. [`FrontendMetrics`] is the curried form of the metric vectors:
//! names are resolved once per frontend and every sample carries the
//! `frontend` label.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use thiserror::Error;

pub const READ_BYTES: &str = "http_frontend_read_bytes";
pub const WRITE_BYTES: &str = "http_frontend_write_bytes";
pub const REQUESTS_TOTAL: &str = "http_frontend_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "http_frontend_request_duration_seconds";
pub const ACTIVE_CONNECTIONS: &str = "http_frontend_active_connections";
pub const IDLE_CONNECTIONS: &str = "http_frontend_idle_connections";

static NAMESPACE: OnceLock<String> = OnceLock::new();

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry already initialized")]
    AlreadyInitialized,
    #[error("failed to install Prometheus exporter: {0}")]
    Exporter(#[from] metrics_exporter_prometheus::BuildError),
}

/// Installs the Prometheus exporter and fixes the metric namespace.
/// May be called at most once per process; a second call fails with
/// [`TelemetryError::AlreadyInitialized`]. Frontends constructed before
/// `init` emit unprefixed metric names.
pub fn init(namespace: &str, listen_addr: SocketAddr) -> Result<(), TelemetryError> {
    NAMESPACE
        .set(namespace.to_string())
        .map_err(|_| TelemetryError::AlreadyInitialized)?;
    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .set_buckets_for_metric(
            Matcher::Suffix(REQUEST_DURATION_SECONDS.to_string()),
            &duration_buckets(),
        )?
        .install()?;
    Ok(())
}

/// Request duration buckets: {0.005, 0.01, 0.025}, then 0.05 through 1.00
/// in steps of 0.05 (rounded to two decimals), then {2.5, 5, 10, 25, 50,
/// 100}.
pub fn duration_buckets() -> Vec<f64> {
    let mut buckets = vec![0.005, 0.01, 0.025];
    for step in 1..=20 {
        buckets.push((step as f64 * 0.05 * 100.0).round() / 100.0);
    }
    buckets.extend([2.5, 5.0, 10.0, 25.0, 50.0, 100.0]);
    buckets
}

fn metric_name(base: &str) -> String {
    match NAMESPACE.get() {
        Some(namespace) if !namespace.is_empty() => format!("{namespace}_{base}"),
        _ => base.to_string(),
    }
}

/// Per-request label set shared by the byte counters, the request counter,
/// and the duration histogram. Values default to empty strings when a
/// request never progressed far enough to fill them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestLabels {
    pub address: String,
    pub host: String,
    pub path: String,
    pub method: String,
    pub backend: String,
    pub server: String,
    pub code: String,
}

/// Metric emitters curried with one frontend's name.
#[derive(Debug, Clone)]
pub struct FrontendMetrics {
    frontend: String,
    read_bytes: String,
    write_bytes: String,
    requests_total: String,
    request_duration_seconds: String,
    active_connections: String,
    idle_connections: String,
}

impl FrontendMetrics {
    pub fn new(frontend: &str) -> Self {
        Self {
            frontend: frontend.to_string(),
            read_bytes: metric_name(READ_BYTES),
            write_bytes: metric_name(WRITE_BYTES),
            requests_total: metric_name(REQUESTS_TOTAL),
            request_duration_seconds: metric_name(REQUEST_DURATION_SECONDS),
            active_connections: metric_name(ACTIVE_CONNECTIONS),
            idle_connections: metric_name(IDLE_CONNECTIONS),
        }
    }

    pub fn record_read_bytes(&self, labels: &RequestLabels, bytes: u64) {
        counter!(self.read_bytes.clone(), &self.request_labels(labels)).increment(bytes);
    }

    pub fn record_write_bytes(&self, labels: &RequestLabels, bytes: u64) {
        counter!(self.write_bytes.clone(), &self.request_labels(labels)).increment(bytes);
    }

    /// One sample per completed request; `error` is the error group, empty
    /// on non-error completions.
    pub fn record_request(&self, labels: &RequestLabels, error: &str) {
        let full = [
            ("frontend", self.frontend.clone()),
            ("address", labels.address.clone()),
            ("host", labels.host.clone()),
            ("path", labels.path.clone()),
            ("method", labels.method.clone()),
            ("backend", labels.backend.clone()),
            ("server", labels.server.clone()),
            ("code", labels.code.clone()),
            ("error", error.to_string()),
        ];
        counter!(self.requests_total.clone(), &full).increment(1);
    }

    pub fn observe_request_duration(&self, labels: &RequestLabels, seconds: f64) {
        histogram!(self.request_duration_seconds.clone(), &self.request_labels(labels))
            .record(seconds);
    }

    pub fn incr_active_connections(&self, address: &str) {
        gauge!(self.active_connections.clone(), &self.connection_labels(address)).increment(1.0);
    }

    pub fn decr_active_connections(&self, address: &str) {
        gauge!(self.active_connections.clone(), &self.connection_labels(address)).decrement(1.0);
    }

    pub fn incr_idle_connections(&self, address: &str) {
        gauge!(self.idle_connections.clone(), &self.connection_labels(address)).increment(1.0);
    }

    pub fn decr_idle_connections(&self, address: &str) {
        gauge!(self.idle_connections.clone(), &self.connection_labels(address)).decrement(1.0);
    }

    fn request_labels(&self, labels: &RequestLabels) -> [(&'static str, String); 8] {
        [
            ("frontend", self.frontend.clone()),
            ("address", labels.address.clone()),
            ("host", labels.host.clone()),
            ("path", labels.path.clone()),
            ("method", labels.method.clone()),
            ("backend", labels.backend.clone()),
            ("server", labels.server.clone()),
            ("code", labels.code.clone()),
        ]
    }

    fn connection_labels(&self, address: &str) -> [(&'static str, String); 2] {
        [
            ("frontend", self.frontend.clone()),
            ("address", address.to_string()),
        ]
    }
}
