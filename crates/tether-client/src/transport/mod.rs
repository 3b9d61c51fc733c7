//! Transport implementations for reaching a tether server.
//!
//! A transport moves one encoded JSON-RPC message to the server and brings
//! back the raw reply. Interpreting statuses and bodies is left to
//! [`crate::SessionClient`] so every transport behaves the same.

pub mod http;
pub mod local;

pub use self::http::HttpTransport;
pub use local::LocalTransport;

use async_trait::async_trait;

use crate::error::ClientResult;

/// Raw reply to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// HTTP-equivalent status code.
    pub status: u16,
    /// Session identifier echoed by the server.
    pub session_id: Option<String>,
    /// Reply body, empty for notifications.
    pub body: Vec<u8>,
}

/// Transport trait for different transport implementations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message, optionally tagged with a session id, and return the reply.
    async fn exchange(&self, session_id: Option<&str>, message: &[u8]) -> ClientResult<Exchange>;

    /// Ask the server to forget `session_id`.
    async fn terminate(&self, session_id: &str) -> ClientResult<()>;

    /// Human-readable description of the remote endpoint.
    fn endpoint(&self) -> String;
}
