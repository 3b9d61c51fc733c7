//! Session-scoped key/value storage with sliding per-namespace TTLs.
//!
//! Every session owns one namespace, addressed by its session identifier.
//! A namespace is created implicitly by its first write and disappears when
//! its TTL elapses without further writes or when its last field is deleted.
//!
//! Two backends implement [`KeyedTtlStore`]:
//! - [`RedisStore`]: durable and shared by every service instance.
//! - [`MemoryStore`]: volatile, single-instance, with lazy expiry.
//!
//! The backend is chosen once at startup from [`StoreConfig`] via
//! [`open_store`] and never changes for the lifetime of the process.
//!
//! # Consistency
//!
//! `list_keys` and `copy_namespace` operate on a snapshot of the source
//! namespace taken at scan time. Writes racing with a copy may or may not be
//! included in it; the copy itself is applied all-or-nothing.

pub mod error;
pub mod memory;
pub mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::{StoreBackend, StoreConfig};

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Storage contract shared by every session store backend.
///
/// `namespace` is an opaque session identifier and `field` a short name such
/// as `"counter"` or `"notes"`. Values are already-serialized payloads; typed
/// access lives in [`crate::session::SessionHandle`].
#[async_trait]
pub trait KeyedTtlStore: Send + Sync {
    /// Short backend name for health reports and logs.
    fn backend(&self) -> &'static str;

    /// Read one field. Absence is `Ok(None)`. Never refreshes the TTL.
    async fn get(&self, namespace: &str, field: &str) -> StoreResult<Option<String>>;

    /// Write one field and reset the namespace TTL to `ttl` from now.
    async fn set(&self, namespace: &str, field: &str, value: &str, ttl: Duration)
    -> StoreResult<()>;

    /// Remove one field. Removing an absent field succeeds.
    async fn delete(&self, namespace: &str, field: &str) -> StoreResult<()>;

    /// Names of the live fields in a namespace (empty when it does not exist).
    async fn list_keys(&self, namespace: &str) -> StoreResult<Vec<String>>;

    /// Copy every live field of `src` into `dst` and give `dst` a fresh TTL.
    ///
    /// Returns the number of fields copied. `src` is left untouched. An
    /// absent or empty `src` copies nothing and returns 0. Fields already in
    /// `dst` that `src` lacks are kept. On error nothing has been written.
    async fn copy_namespace(&self, src: &str, dst: &str, ttl: Duration) -> StoreResult<usize>;

    /// Atomically add `delta` to an integer field (absent counts as 0),
    /// refresh the namespace TTL and return the new value.
    async fn increment(
        &self,
        namespace: &str,
        field: &str,
        delta: i64,
        ttl: Duration,
    ) -> StoreResult<i64>;

    /// Identifiers of every namespace that currently holds data.
    async fn list_namespaces(&self) -> StoreResult<Vec<String>>;

    /// Cheap liveness probe. Does not read, write or extend anything.
    async fn ping(&self) -> StoreResult<()>;
}

/// Open the store backend selected by the configuration.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the networked backend
/// cannot be reached at startup.
pub async fn open_store(config: &StoreConfig) -> StoreResult<Arc<dyn KeyedTtlStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!(backend = "memory", "Using in-process session store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Redis => {
            let url = config.url.as_deref().filter(|url| !url.is_empty()).ok_or_else(|| {
                StoreError::Config("redis backend requires 'url'".to_string())
            })?;
            let store =
                RedisStore::connect(url, Duration::from_millis(config.timeout_ms)).await?;
            info!(backend = "redis", "Using networked session store");
            Ok(Arc::new(store))
        }
    }
}
