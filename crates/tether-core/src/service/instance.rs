//! Immutable identity of one running service instance.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Which server answered, fixed at startup.
#[derive(Debug, Clone)]
pub struct InstanceInfo {
    id: String,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl InstanceInfo {
    /// Record a new instance starting now.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), started_at: Utc::now(), started: Instant::now() }
    }

    /// Configured instance identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wall-clock start time.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Seconds since start, rounded to one decimal place.
    pub fn uptime_seconds(&self) -> f64 {
        (self.started.elapsed().as_secs_f64() * 10.0).round() / 10.0
    }
}
