//! HTTP/1.x reverse-proxy frontend core.
//!
//! The frontend owns the accept side of the proxy: it parses successive
//! HTTP/1.0/1.1 request headers off a client connection, matches each
//! request against a pattern-based route table with optional access
//! restrictions, and dispatches to a backend handler, governing keep-alive
//! lifecycle, request timeouts, and per-request telemetry along the way.
//!
//! The accept loop and the backends themselves live outside this crate;
//! see [`HttpFrontend::serve_connection`] for the handoff point and
//! [`HttpBackend`] for the dispatch contract.

mod config;
mod conn;
mod error;
mod frontend;
mod header;

pub use config::{BackendHandle, FrontendError, FrontendOptions, DEFAULT_MAX_HEADER_BYTES};
pub use conn::{ConnStats, ConnStream, FeConn};
pub use error::{ErrorGroup, HttpError, ServeError};
pub use frontend::{HttpBackend, HttpFrontend, RequestDescriptor};
pub use header::{Header, Headers};

pub use gate_observe as observe;
pub use gate_route::{Pattern, PatternError, Restriction, Route, RouteTable};
