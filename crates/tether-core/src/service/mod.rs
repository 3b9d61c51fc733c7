//! Session-backed tool handlers and health reporting.
//!
//! Handlers are ordinary callers of [`crate::session::SessionHandle`]; every
//! result is tagged with the answering instance.

pub mod health;
pub mod instance;
pub mod tools;

pub use health::{HealthReport, HealthStatus};
pub use instance::InstanceInfo;
pub use tools::{SessionService, ToolError};
