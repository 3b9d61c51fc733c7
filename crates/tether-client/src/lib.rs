//! Tether Client - talk to tether servers and ride out instance failover.
//!
//! - [`SessionClient`] holds one session on one server over a [`Transport`]
//! - [`ResilientClient`] wraps a [`Connector`] and transparently reconnects,
//!   resumes the previous session's state and replays failed calls
//!
//! Both implement [`ToolClient`], so code written against the trait works
//! with either.
//!
//! # Example
//!
//! ```rust,no_run
//! use serde_json::json;
//! use tether_client::{BackoffPolicy, HttpConnector, ResilientClient, ToolClient};
//!
//! #[tokio::main]
//! async fn main() -> tether_client::ClientResult<()> {
//!     let connector = HttpConnector::new("http://localhost:8000");
//!     let client = ResilientClient::connect(connector, BackoffPolicy::default()).await?;
//!     let output = client.call_tool("increment_counter", json!({})).await?;
//!     println!("{}", output.text().unwrap_or_default());
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod client;
pub mod connector;
pub mod error;
pub mod resilient;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use client::{SessionClient, ToolClient};
pub use connector::{Connector, HttpConnector, LocalConnector};
pub use error::{ClientError, ClientResult};
pub use resilient::{ConnectionState, ResilientClient};
pub use transport::http::HttpTransport;
pub use transport::local::LocalTransport;
pub use transport::{Exchange, Transport};

pub use tether_core::protocol::{ReadResourceResult, ResumeReport, Tool, ToolOutput};
