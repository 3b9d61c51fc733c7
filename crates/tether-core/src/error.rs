//! Error types for tether core.

use crate::store::StoreError;
use thiserror::Error;

/// Core error type for tether operations.
#[derive(Error, Debug)]
pub enum TetherError {
    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(#[from] hyper::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Address parsing errors
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Session store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for tether operations.
pub type Result<T> = std::result::Result<T, TetherError>;
