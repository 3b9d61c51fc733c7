//! In-process session store with lazy TTL expiry.
//!
//! Intended for single-instance deployments and tests. Nothing is shared
//! with other processes and everything is lost on restart.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::{KeyedTtlStore, StoreError, StoreResult};

/// Fields of one namespace plus its absolute expiry.
#[derive(Debug, Clone)]
struct Namespace {
    fields: BTreeMap<String, String>,
    expires_at: Instant,
}

impl Namespace {
    fn empty(now: Instant) -> Self {
        Self { fields: BTreeMap::new(), expires_at: now }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Volatile [`KeyedTtlStore`] backed by a map guarded by one lock.
///
/// Expiry is evaluated when a namespace is touched; an expired namespace is
/// treated as absent and dropped from the map at that point. There is no
/// background sweep. Every mutation happens under the write lock, which
/// makes `increment` and `copy_namespace` atomic for this single instance.
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of namespaces physically held, including expired ones that
    /// have not been touched since they expired.
    pub async fn resident_namespaces(&self) -> usize {
        self.namespaces.read().await.len()
    }

    /// Drop `namespace` if it has expired. Returns true when it was dropped.
    fn purge_expired(
        namespaces: &mut HashMap<String, Namespace>,
        namespace: &str,
        now: Instant,
    ) -> bool {
        let expired = namespaces.get(namespace).is_some_and(|ns| !ns.is_live(now));
        if expired {
            namespaces.remove(namespace);
            debug!(namespace = %namespace, "Dropped expired namespace");
        }
        expired
    }

    /// Live namespace entry for a write, reset if it had expired.
    fn writable<'a>(
        namespaces: &'a mut HashMap<String, Namespace>,
        namespace: &str,
        now: Instant,
    ) -> &'a mut Namespace {
        let entry =
            namespaces.entry(namespace.to_string()).or_insert_with(|| Namespace::empty(now));
        if !entry.is_live(now) {
            entry.fields.clear();
        }
        entry
    }
}

#[async_trait]
impl KeyedTtlStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, namespace: &str, field: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        {
            let namespaces = self.namespaces.read().await;
            match namespaces.get(namespace) {
                None => return Ok(None),
                Some(ns) if ns.is_live(now) => return Ok(ns.fields.get(field).cloned()),
                Some(_) => {}
            }
        }

        let mut namespaces = self.namespaces.write().await;
        Self::purge_expired(&mut namespaces, namespace, now);
        Ok(None)
    }

    async fn set(
        &self,
        namespace: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<()> {
        let now = Instant::now();
        let mut namespaces = self.namespaces.write().await;
        let entry = Self::writable(&mut namespaces, namespace, now);
        entry.fields.insert(field.to_string(), value.to_string());
        entry.expires_at = now + ttl;
        Ok(())
    }

    async fn delete(&self, namespace: &str, field: &str) -> StoreResult<()> {
        let now = Instant::now();
        let mut namespaces = self.namespaces.write().await;
        if Self::purge_expired(&mut namespaces, namespace, now) {
            return Ok(());
        }
        let now_empty = match namespaces.get_mut(namespace) {
            Some(ns) => {
                ns.fields.remove(field);
                ns.fields.is_empty()
            }
            None => false,
        };
        if now_empty {
            namespaces.remove(namespace);
        }
        Ok(())
    }

    async fn list_keys(&self, namespace: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        {
            let namespaces = self.namespaces.read().await;
            match namespaces.get(namespace) {
                None => return Ok(Vec::new()),
                Some(ns) if ns.is_live(now) => return Ok(ns.fields.keys().cloned().collect()),
                Some(_) => {}
            }
        }

        let mut namespaces = self.namespaces.write().await;
        Self::purge_expired(&mut namespaces, namespace, now);
        Ok(Vec::new())
    }

    async fn copy_namespace(&self, src: &str, dst: &str, ttl: Duration) -> StoreResult<usize> {
        let now = Instant::now();
        let mut namespaces = self.namespaces.write().await;
        Self::purge_expired(&mut namespaces, src, now);

        let snapshot = match namespaces.get(src) {
            Some(ns) => ns.fields.clone(),
            None => return Ok(0),
        };
        if snapshot.is_empty() || src == dst {
            return Ok(snapshot.len());
        }

        let copied = snapshot.len();
        let entry = Self::writable(&mut namespaces, dst, now);
        entry.fields.extend(snapshot);
        entry.expires_at = now + ttl;
        Ok(copied)
    }

    async fn increment(
        &self,
        namespace: &str,
        field: &str,
        delta: i64,
        ttl: Duration,
    ) -> StoreResult<i64> {
        let now = Instant::now();
        let mut namespaces = self.namespaces.write().await;
        let entry = Self::writable(&mut namespaces, namespace, now);

        let current = match entry.fields.get(field) {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map_err(|_| StoreError::NotAnInteger { field: field.to_string() })?,
            None => 0,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| StoreError::Command(format!("increment of '{}' would overflow", field)))?;

        entry.fields.insert(field.to_string(), next.to_string());
        entry.expires_at = now + ttl;
        Ok(next)
    }

    async fn list_namespaces(&self) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        let mut namespaces = self.namespaces.write().await;
        namespaces.retain(|_, ns| ns.is_live(now));
        let mut ids: Vec<String> = namespaces.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
