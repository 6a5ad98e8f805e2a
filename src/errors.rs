//! Error types for the relay client
//!
//! Every public operation either resolves with a fully typed result or fails
//! with one of the kinds below. Nothing in the crate retries on its own.

use thiserror::Error;

/// Error taxonomy for all client operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// Malformed address, hex string or amount in a wire payload
    ///
    /// Raised during decode (or bid pre-flight checks); the item is never
    /// partially applied.
    #[error("Validation error (field={field}): {reason}")]
    Validation {
        /// Name of the offending wire field
        field: String,
        /// What was wrong with it
        reason: String,
    },

    /// WebSocket connect/send/heartbeat failure
    ///
    /// Terminal for the channel instance that produced it.
    #[error("Transport error: {0}")]
    Transport(String),

    /// No response arrived for a correlated request in time
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    CorrelationTimeout { request_id: String, timeout_ms: u64 },

    /// Non-2xx HTTP response; body is kept verbatim
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// A successful response carried no body where one was required
    #[error("No data returned: {0}")]
    NoData(String),

    /// The relay answered a WebSocket request with `status: "error"`
    #[error("Relay error: {0}")]
    Relay(String),

    /// Unsupported chain id or missing adapter configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation called without its preconditions
    #[error("Caller contract violated: {0}")]
    CallerContract(String),
}

impl ClientError {
    /// Get the error category for metrics and log fields
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Transport(_) => "transport",
            Self::CorrelationTimeout { .. } => "timeout",
            Self::Http { .. } => "http",
            Self::NoData(_) => "no_data",
            Self::Relay(_) => "relay",
            Self::Configuration(_) => "config",
            Self::CallerContract(_) => "caller",
        }
    }

    /// HTTP status code, if the error came from an HTTP response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// Convenience constructors for common error scenarios
impl ClientError {
    /// Create a validation error for a named wire field
    pub fn invalid(field: impl Into<String>, reason: impl ToString) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a configuration error for an unknown chain id
    pub fn unsupported_chain(chain_id: &str) -> Self {
        Self::Configuration(format!("unsupported chain id: {chain_id}"))
    }

    /// Create a transport error
    pub fn transport(reason: impl ToString) -> Self {
        Self::Transport(reason.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => Self::Transport(err.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
