use std::io;

use thiserror::Error;

/// Error taxonomy surfaced externally as the `error` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorGroup {
    /// Header-read failure after at least one byte arrived.
    Communication,
    /// Malformed status line, unsupported version, buffer-order violation.
    Protocol,
    /// The request exceeded the frontend timeout.
    FrontendTimeout,
    /// A backend-defined group, passed through opaquely.
    Other(&'static str),
    /// Reserved for failures without a classified group.
    Unknown,
}

impl ErrorGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Communication => "communication",
            Self::Protocol => "protocol",
            Self::FrontendTimeout => "frontend timeout",
            Self::Other(group) => group,
            Self::Unknown => "unknown",
        }
    }
}

/// A classified request failure. The message names the originating site
/// (listener address and frontend name) for the debug log; the metric
/// system only ever sees the group.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HttpError {
    pub group: ErrorGroup,
    pub message: String,
    #[source]
    pub cause: Option<io::Error>,
}

impl HttpError {
    pub fn communication(message: String, cause: io::Error) -> Self {
        Self {
            group: ErrorGroup::Communication,
            message,
            cause: Some(cause),
        }
    }

    pub fn protocol(message: String) -> Self {
        Self {
            group: ErrorGroup::Protocol,
            message,
            cause: None,
        }
    }

    pub fn frontend_timeout(message: String) -> Self {
        Self {
            group: ErrorGroup::FrontendTimeout,
            message,
            cause: None,
        }
    }

    pub fn emit_debug_log(&self) {
        tracing::debug!(group = self.group.as_str(), "{}", self.message);
    }
}

/// How one pipeline invocation ended when it did not end cleanly. Any
/// variant terminates the connection loop; only [`ServeError::Http`]
/// contributes an `error` metric label.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Peer closed during idle, or a restriction denied the request. The
    /// connection ends without error accounting.
    #[error("graceful termination")]
    GracefulTermination,
    /// Clean upstream close after a complete response.
    #[error("expected EOF")]
    ExpectedEof,
    #[error(transparent)]
    Http(#[from] HttpError),
}

impl ServeError {
    /// Value for the `error` metric label; empty for the sentinels.
    pub fn error_label(&self) -> &'static str {
        match self {
            Self::GracefulTermination | Self::ExpectedEof => "",
            Self::Http(error) => error.group.as_str(),
        }
    }
}
