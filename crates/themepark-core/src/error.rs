//! Error types for the theme-park proxy

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type shared by the proxy crates
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP-related errors
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// Invalid HTTP request
    #[error("Invalid HTTP request: {0}")]
    InvalidRequest(String),

    /// Upstream connection error
    #[error("Failed to connect to upstream: {0}")]
    UpstreamConnection(String),

    /// Upstream timeout
    #[error("Upstream request timed out")]
    UpstreamTimeout,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Middleware error
    #[error("Middleware error: {0}")]
    Middleware(String),

    /// The client went away or the handler aborted on purpose.
    ///
    /// Recovered silently at the middleware boundary.
    #[error("handler aborted")]
    Aborted,

    /// The underlying response sink lacks an optional capability
    #[error("{0} is not supported by the underlying response sink")]
    Unsupported(&'static str),

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    HttpError(#[from] http::Error),

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert error to HTTP status code
    pub fn to_status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Http(_) | Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::UpstreamConnection(_) => StatusCode::BAD_GATEWAY,
            Error::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this is the expected "client disconnected" signal
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}

/// Panic payload signalling an intentional abort of the current request.
///
/// Handlers may `std::panic::panic_any(AbortHandler)` to bail out; the
/// rewriting middleware swallows it without logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortHandler;
