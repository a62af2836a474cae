// ABOUTME: Error types and handling for the TARP framework
// ABOUTME: Provides domain-specific error variants plus the three handler failures

//! Error types for TARP.
//!
//! [`TarpError`] covers everything that can go wrong building, dispatching,
//! or consuming a TARP request: malformed envelopes, registry misuse,
//! transport failures, and the three first-class handler failures a user
//! callback can raise (`OperationInProgress`, `InvalidServerState`, and a
//! generic failure).

use thiserror::Error;

/// Result type alias for TARP operations.
pub type Result<T> = std::result::Result<T, TarpError>;

/// Comprehensive error type for all TARP operations.
#[derive(Debug, Error, Clone)]
pub enum TarpError {
    /// Envelope construction or parsing failed.
    #[error("envelope error: {0}")]
    Envelope(String),

    /// Configuration is invalid or incomplete.
    #[error("configuration error: {0}")]
    Config(String),

    /// A transport-level failure (connection refused, TLS handshake, etc).
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON/CBOR (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Endpoint registry misuse (unknown name, wrong flavor).
    #[error("registry error: {0}")]
    Registry(String),

    /// Request routing/dispatch could not be completed.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// A handler reported that the requested operation is still running.
    /// Surfaces as HTTP 503 with a `Retry-After` header.
    #[error("operation in progress: {message}")]
    OperationInProgress {
        message: String,
        retry_after: Option<u64>,
    },

    /// A handler reported that the server is not in a state that can service
    /// the request. Surfaces as HTTP 503 without a retry hint.
    #[error("invalid server state: {message}")]
    InvalidServerState { message: String },

    /// Any other handler failure. Surfaces as HTTP 500.
    #[error("handler error: {0}")]
    Handler(String),
}

impl TarpError {
    pub fn envelope(msg: impl Into<String>) -> Self {
        Self::Envelope(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }

    pub fn operation_in_progress(msg: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::OperationInProgress {
            message: msg.into(),
            retry_after,
        }
    }

    pub fn invalid_server_state(msg: impl Into<String>) -> Self {
        Self::InvalidServerState {
            message: msg.into(),
        }
    }

    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }

    /// The `type` string carried in an error envelope for this error, or
    /// `None` if this error never reaches the wire (e.g. client-side
    /// transport failures).
    pub fn envelope_type(&self) -> &'static str {
        match self {
            Self::OperationInProgress { .. } => "OperationInProgress",
            Self::InvalidServerState { .. } => "InvalidServerState",
            _ => "generic",
        }
    }

    /// HTTP status code the dispatcher maps this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::OperationInProgress { .. } => 503,
            Self::InvalidServerState { .. } => 503,
            Self::Registry(_) => 404,
            Self::Dispatch(_) => 400,
            _ => 500,
        }
    }
}

impl From<serde_json::Error> for TarpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for TarpError {
    fn from(err: ciborium::de::Error<std::io::Error>) -> Self {
        Self::Serialization(format!("CBOR decode failed: {err}"))
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for TarpError {
    fn from(err: ciborium::ser::Error<std::io::Error>) -> Self {
        Self::Serialization(format!("CBOR encode failed: {err}"))
    }
}

impl From<base64::DecodeError> for TarpError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Serialization(format!("base64 decode failed: {err}"))
    }
}

#[cfg(feature = "rest-client")]
impl From<reqwest::Error> for TarpError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for TarpError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::Transport(format!("operation timed out: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let err = TarpError::envelope("bad envelope");
        assert!(matches!(err, TarpError::Envelope(_)));
    }

    #[test]
    fn test_operation_in_progress_envelope_type() {
        let err = TarpError::operation_in_progress("still running", Some(10));
        assert_eq!(err.envelope_type(), "OperationInProgress");
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_invalid_server_state_envelope_type() {
        let err = TarpError::invalid_server_state("not ready");
        assert_eq!(err.envelope_type(), "InvalidServerState");
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_generic_handler_error() {
        let err = TarpError::handler("boom");
        assert_eq!(err.envelope_type(), "generic");
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_result_alias() {
        fn fails() -> Result<()> {
            Err(TarpError::config("missing field"))
        }
        assert!(fails().is_err());
    }
}
