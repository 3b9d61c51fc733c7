//! Tether Core - session state that survives instance failover.
//!
//! This crate provides:
//! - A session-scoped key/value store with sliding TTLs and two backends
//! - Typed per-session handles and the session recovery operation
//! - The JSON-RPC service surface, HTTP server and health probe
//! - Configuration management and error handling
//!
//! # Example
//!
//! ```rust,no_run
//! use tether_core::{config::Config, server};
//!
//! #[tokio::main]
//! async fn main() -> tether_core::error::Result<()> {
//!     let config = Config::load()?;
//!     server::run(&config).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod recovery;
pub mod server;
pub mod service;
pub mod session;
pub mod store;

pub use config::Config;
pub use error::{Result, TetherError};
pub use recovery::{RecoveryCoordinator, ResumeOutcome, ResumeStatus};
pub use server::{Dispatcher, Server};
pub use service::{HealthReport, HealthStatus, InstanceInfo, SessionService, ToolError};
pub use session::SessionHandle;
pub use store::{KeyedTtlStore, MemoryStore, RedisStore, StoreError, StoreResult, open_store};
