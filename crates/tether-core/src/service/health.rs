//! Liveness reporting for the external load balancer.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::KeyedTtlStore;

/// Overall health of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Process and store are both reachable.
    Ok,
    /// The process is up but the store is not.
    Degraded,
}

/// Body of the health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,
    /// Answering instance.
    pub instance: String,
    /// Store backend name, or `"unreachable"`.
    pub store: String,
}

impl HealthReport {
    /// Probe `store` and build the report.
    pub async fn probe(store: &dyn KeyedTtlStore, instance: &str) -> Self {
        match store.ping().await {
            Ok(()) => Self {
                status: HealthStatus::Ok,
                instance: instance.to_string(),
                store: store.backend().to_string(),
            },
            Err(e) => {
                warn!(instance, error = %e, "Store ping failed, reporting degraded");
                Self {
                    status: HealthStatus::Degraded,
                    instance: instance.to_string(),
                    store: "unreachable".to_string(),
                }
            }
        }
    }

    /// Whether the instance should receive traffic.
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}
