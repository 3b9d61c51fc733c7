//! Error types for tether client operations.

use tether_core::protocol::codes;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while talking to a tether server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection failed: refused, reset, timed out or cut short.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server no longer knows this session (restarted or rerouted).
    #[error("Session lost: {0}")]
    SessionLost(String),

    /// The server reported its session store as unreachable.
    #[error("Server unavailable: {0}")]
    Unavailable(String),

    /// The server answered with an unexpected HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error text from the response, if any.
        message: String,
    },

    /// The server rejected the request with a JSON-RPC error.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i32,
        /// Error message.
        message: String,
    },

    /// The server's reply did not follow the protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Every reconnect and replay attempt failed.
    #[error("Retry budget exhausted after {attempts} attempts: {source}")]
    RetryBudgetExhausted {
        /// Reconnect attempts made.
        attempts: u32,
        /// The failure that started the recovery.
        #[source]
        source: Box<ClientError>,
    },

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// The client gave up earlier and no longer issues calls.
    #[error("Client terminated after an unrecoverable failure")]
    Terminated,

    /// Client configuration error.
    #[error("Client configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Map a JSON-RPC error object to a client error.
    pub fn from_rpc(code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            codes::STORE_UNAVAILABLE => Self::Unavailable(message),
            codes::SESSION_NOT_FOUND => Self::SessionLost(message),
            _ => Self::Rpc { code, message },
        }
    }

    /// Whether reconnecting and replaying may fix this failure.
    ///
    /// Application errors (JSON-RPC errors, malformed replies) are never
    /// retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::SessionLost(_) | Self::Unavailable(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Http { status: status.as_u16(), message: err.to_string() },
            None if err.is_decode() => Self::Protocol(err.to_string()),
            None => Self::Transport(err.to_string()),
        }
    }
}
