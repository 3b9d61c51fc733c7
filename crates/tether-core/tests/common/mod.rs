//! Shared helpers for tether-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tether_core::store::{KeyedTtlStore, MemoryStore, StoreError, StoreResult};

/// A memory store whose backend can be switched off to simulate an outage.
#[derive(Default)]
pub struct SwitchableStore {
    inner: MemoryStore,
    down: AtomicBool,
}

impl SwitchableStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unreachable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyedTtlStore for SwitchableStore {
    fn backend(&self) -> &'static str {
        "switchable"
    }

    async fn get(&self, namespace: &str, field: &str) -> StoreResult<Option<String>> {
        self.check()?;
        self.inner.get(namespace, field).await
    }

    async fn set(&self, namespace: &str, field: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.check()?;
        self.inner.set(namespace, field, value, ttl).await
    }

    async fn delete(&self, namespace: &str, field: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.delete(namespace, field).await
    }

    async fn list_keys(&self, namespace: &str) -> StoreResult<Vec<String>> {
        self.check()?;
        self.inner.list_keys(namespace).await
    }

    async fn copy_namespace(&self, src: &str, dst: &str, ttl: Duration) -> StoreResult<usize> {
        self.check()?;
        self.inner.copy_namespace(src, dst, ttl).await
    }

    async fn increment(&self, namespace: &str, field: &str, delta: i64, ttl: Duration) -> StoreResult<i64> {
        self.check()?;
        self.inner.increment(namespace, field, delta, ttl).await
    }

    async fn list_namespaces(&self) -> StoreResult<Vec<String>> {
        self.check()?;
        self.inner.list_namespaces().await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check()
    }
}
