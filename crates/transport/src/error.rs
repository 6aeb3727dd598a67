//! Transport error types.

/// Errors produced by a single network exchange.
///
/// `Clone` so an orchestrator can keep the first failure as a root cause
/// while still returning it from the failing task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("cancelled")]
    Cancelled,

    #[error("request timed out")]
    Timeout,

    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// `true` for an abort caused by the caller's cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_builder() {
            TransportError::InvalidRequest(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}
