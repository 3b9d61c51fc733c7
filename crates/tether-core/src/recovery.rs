//! Session recovery after failover.
//!
//! When a client loses the instance that held its session it reconnects,
//! receives a new session identifier and asks the new instance to resume the
//! old one. Resuming copies the old namespace into the new one. The old
//! namespace is never deleted, so repeating a resume whose first attempt may
//! or may not have landed simply re-applies the same source data.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::{KeyedTtlStore, StoreResult};

/// How a resume request was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeStatus {
    /// The previous and current identifiers are the same; nothing to recover.
    SameSession,
    /// The previous namespace was copied into the current one.
    Resumed,
}

/// Result of [`RecoveryCoordinator::resume_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeOutcome {
    /// Resolution of the request.
    pub status: ResumeStatus,
    /// Number of fields copied into the current namespace.
    pub keys_migrated: usize,
}

impl ResumeOutcome {
    /// Outcome for a resume against the caller's own session.
    pub const fn same_session() -> Self {
        Self { status: ResumeStatus::SameSession, keys_migrated: 0 }
    }

    /// Outcome for a completed copy of `keys_migrated` fields.
    pub const fn resumed(keys_migrated: usize) -> Self {
        Self { status: ResumeStatus::Resumed, keys_migrated }
    }
}

/// Drives namespace copies on behalf of resuming sessions.
#[derive(Clone)]
pub struct RecoveryCoordinator {
    store: Arc<dyn KeyedTtlStore>,
    default_ttl: Duration,
}

impl RecoveryCoordinator {
    /// Create a coordinator over `store`; resumed namespaces get `default_ttl`.
    pub fn new(store: Arc<dyn KeyedTtlStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    /// Copy the state of `previous` into `current`.
    ///
    /// A missing or expired `previous` namespace resumes with zero keys.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the copy fails; `current` then holds
    /// nothing from `previous`.
    pub async fn resume_session(&self, current: &str, previous: &str) -> StoreResult<ResumeOutcome> {
        if current == previous {
            info!(session_id = %current, "Resume requested for the current session");
            return Ok(ResumeOutcome::same_session());
        }

        let keys_migrated = self.store.copy_namespace(previous, current, self.default_ttl).await?;
        info!(
            session_id = %current,
            previous_session_id = %previous,
            keys_migrated,
            "Resumed session state"
        );
        Ok(ResumeOutcome::resumed(keys_migrated))
    }
}

impl std::fmt::Debug for RecoveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCoordinator")
            .field("backend", &self.store.backend())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const TTL: Duration = Duration::from_secs(1800);

    fn coordinator() -> (Arc<MemoryStore>, RecoveryCoordinator) {
        let store = Arc::new(MemoryStore::new());
        let coordinator = RecoveryCoordinator::new(store.clone(), TTL);
        (store, coordinator)
    }

    #[tokio::test]
    async fn test_same_session_is_trivial() {
        let (store, coordinator) = coordinator();
        store.set("abc123", "counter", "5", TTL).await.unwrap();

        let outcome = coordinator.resume_session("abc123", "abc123").await.unwrap();
        assert_eq!(outcome, ResumeOutcome::same_session());
    }

    #[tokio::test]
    async fn test_unknown_previous_resumes_empty() {
        let (store, coordinator) = coordinator();
        let outcome = coordinator.resume_session("xyz789", "never-existed").await.unwrap();
        assert_eq!(outcome, ResumeOutcome::resumed(0));
        assert!(store.list_keys("xyz789").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_copies_and_keeps_source() {
        let (store, coordinator) = coordinator();
        store.set("abc123", "counter", "5", TTL).await.unwrap();
        store.set("abc123", "notes", r#"["a"]"#, TTL).await.unwrap();

        let outcome = coordinator.resume_session("xyz789", "abc123").await.unwrap();
        assert_eq!(outcome, ResumeOutcome::resumed(2));
        assert_eq!(store.get("xyz789", "counter").await.unwrap().as_deref(), Some("5"));
        assert_eq!(store.get("abc123", "counter").await.unwrap().as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn test_duplicate_resume_is_idempotent() {
        let (store, coordinator) = coordinator();
        store.set("abc123", "counter", "5", TTL).await.unwrap();

        let first = coordinator.resume_session("xyz789", "abc123").await.unwrap();
        let second = coordinator.resume_session("xyz789", "abc123").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list_keys("xyz789").await.unwrap(), vec!["counter".to_string()]);
    }

    #[test]
    fn test_outcome_wire_shape() {
        let json = serde_json::to_value(ResumeOutcome::resumed(2)).unwrap();
        assert_eq!(json, serde_json::json!({"status": "resumed", "keys_migrated": 2}));

        let json = serde_json::to_value(ResumeOutcome::same_session()).unwrap();
        assert_eq!(json["status"], "same_session");
        assert_eq!(json["keys_migrated"], 0);
    }
}
