//! Error types for the session store layer.

use thiserror::Error;

/// Errors that can occur in the session store layer.
///
/// Absence of a field or namespace is never an error; store reads return
/// `Ok(None)` or an empty collection instead.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store could not be reached (refused, dropped, timed out).
    #[error("Store backend unreachable: {0}")]
    Unreachable(String),

    /// A stored payload could not be decoded, or a value could not be encoded.
    #[error("Serialization error for field '{field}': {source}")]
    Serialization {
        /// Field whose payload failed to round-trip.
        field: String,
        /// Underlying decode/encode failure.
        #[source]
        source: serde_json::Error,
    },

    /// An increment targeted a field that does not hold an integer.
    #[error("Field '{field}' does not hold an integer value")]
    NotAnInteger {
        /// Field that was incremented.
        field: String,
    },

    /// The backend rejected a command for a reason other than connectivity.
    #[error("Store command failed: {0}")]
    Command(String),

    /// The store configuration is invalid.
    #[error("Invalid store configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether this error means the backend itself is unavailable.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }

    pub(crate) fn serialization(field: &str, source: serde_json::Error) -> Self {
        Self::Serialization { field: field.to_string(), source }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            Self::Unreachable(err.to_string())
        } else {
            Self::Command(err.to_string())
        }
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
