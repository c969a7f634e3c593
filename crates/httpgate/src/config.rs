use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use gate_route::Route;
use thiserror::Error;

use crate::frontend::HttpBackend;

/// Shared handle to a backend; routes and the default slot all hold one.
pub type BackendHandle = Arc<dyn HttpBackend>;

pub const DEFAULT_MAX_HEADER_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("invalid frontend options: {0}")]
    InvalidOptions(&'static str),
    #[error(transparent)]
    Pattern(#[from] gate_route::PatternError),
}

/// Options for one frontend. Timeouts of zero mean unlimited. Taken by
/// value at construction; the frontend compiles its own route table from
/// the textual patterns and never mutates the options afterwards.
#[derive(Clone)]
pub struct FrontendOptions {
    pub name: String,
    /// Per-request wall-clock budget from header read to backend return.
    pub timeout: Duration,
    /// Maximum idle time between consecutive requests on one connection.
    pub keep_alive_timeout: Duration,
    /// Upper bound on one request's header block.
    pub max_header_bytes: usize,
    /// Serves requests no route matches.
    pub default_backend: BackendHandle,
    pub routes: Vec<Route<BackendHandle>>,
}

impl FrontendOptions {
    pub fn new(name: &str, default_backend: BackendHandle) -> Self {
        Self {
            name: name.to_string(),
            timeout: Duration::ZERO,
            keep_alive_timeout: Duration::ZERO,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            default_backend,
            routes: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), FrontendError> {
        if self.max_header_bytes == 0 {
            return Err(FrontendError::InvalidOptions(
                "max_header_bytes must be non-zero",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for FrontendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrontendOptions")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("keep_alive_timeout", &self.keep_alive_timeout)
            .field("max_header_bytes", &self.max_header_bytes)
            .field("default_backend", &self.default_backend.name())
            .field("routes", &self.routes.len())
            .finish()
    }
}
