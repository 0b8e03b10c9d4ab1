use thiserror::Error;

/// Convenience alias for `Result<T, KestrelError>`.
pub type KestrelResult<T> = Result<T, KestrelError>;

/// Error classification for retry decisions.
///
/// - `InvalidArgument` — malformed input; never retried
/// - `Timeout`         — deadline exhausted; caller MAY retry with a new deadline
/// - `Connection`      — transport fault; retried internally within the deadline
/// - `RoutingStale`    — wrong/absent primary; triggers a meta refresh, then retried
/// - `Application`     — typed server response; surfaced directly
/// - `Cancelled`       — client closed or the call was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Timeout,
    Connection,
    RoutingStale,
    Application,
    Cancelled,
}

/// Top-level error type surfaced by every client operation.
///
/// Variants are cloneable by construction (transport causes are flattened to
/// strings) so that single-flight refreshes and tolerant batches can fan one
/// failure out to many waiters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KestrelError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Connection error ({endpoint}): {detail}")]
    Connection { endpoint: String, detail: String },

    /// The server indicated the addressed partition is not (or no longer)
    /// served by the contacted replica. Carries an optional primary hint.
    #[error("Stale routing: {reason}")]
    RoutingStale {
        reason: String,
        hint: Option<String>,
    },

    /// Typed application-level failure (wire error code + server message).
    #[error("Server error {code}: {message}")]
    Application { code: i32, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Protocol error: {0}")]
    Proto(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl KestrelError {
    /// Classify this error for retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KestrelError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            KestrelError::Timeout(_) => ErrorKind::Timeout,
            KestrelError::Connection { .. } => ErrorKind::Connection,
            KestrelError::RoutingStale { .. } => ErrorKind::RoutingStale,
            KestrelError::Application { .. } => ErrorKind::Application,
            KestrelError::Cancelled => ErrorKind::Cancelled,
            // A malformed frame means the stream is unusable: treated as a
            // transport fault so the session is torn down and rebuilt.
            KestrelError::Proto(_) => ErrorKind::Connection,
            KestrelError::Config(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Whether the executor may transparently retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connection | ErrorKind::RoutingStale)
    }

    /// Whether this error calls for a partition-map refresh before retrying.
    pub fn is_routing_stale(&self) -> bool {
        matches!(self.kind(), ErrorKind::RoutingStale)
    }

    /// Construct a connection error for an endpoint.
    pub fn connection(endpoint: impl Into<String>, detail: impl Into<String>) -> Self {
        KestrelError::Connection {
            endpoint: endpoint.into(),
            detail: detail.into(),
        }
    }

    /// Construct a stale-routing error with an optional primary hint.
    pub fn routing_stale(reason: impl Into<String>, hint: Option<String>) -> Self {
        KestrelError::RoutingStale {
            reason: reason.into(),
            hint,
        }
    }

    /// Construct an invalid-argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        KestrelError::InvalidArgument(msg.into())
    }
}
