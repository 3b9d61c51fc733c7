//! Redis-backed session store shared by every service instance.
//!
//! Each namespace is one Redis hash at `tether:session:{namespace}`. The
//! TTL lives on the hash key, so it is naturally per-namespace: writes reset
//! it with `PEXPIRE`, reads (`HGET`, `HKEYS`) leave it alone.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use super::{KeyedTtlStore, StoreError, StoreResult};

/// Key prefix shared by every namespace hash.
const KEY_PREFIX: &str = "tether:session";

/// `HINCRBY` then `PEXPIRE`. A failed increment aborts the script before the
/// TTL is touched.
const INCREMENT_SCRIPT: &str = r"
local value = redis.call('HINCRBY', KEYS[1], ARGV[1], ARGV[2])
redis.call('PEXPIRE', KEYS[1], ARGV[3])
return value
";

/// Durable [`KeyedTtlStore`] on Redis.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    op_timeout: Duration,
    increment: redis::Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").field("op_timeout", &self.op_timeout).finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis at `url`.
    ///
    /// The connection manager reconnects on its own after a drop; every
    /// command is bounded by `op_timeout`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` for a malformed URL and
    /// `StoreError::Unreachable` if the server cannot be reached.
    pub async fn connect(url: &str, op_timeout: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Config(format!("invalid redis url: {}", e)))?;
        let conn = tokio::time::timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Unreachable(format!("timed out connecting to {}", url)))??;
        debug!("Connected to redis session store");
        Ok(Self { conn, op_timeout, increment: redis::Script::new(INCREMENT_SCRIPT) })
    }

    fn namespace_key(namespace: &str) -> String {
        format!("{}:{}", KEY_PREFIX, namespace)
    }

    fn ttl_millis(ttl: Duration) -> i64 {
        i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
    }

    /// Run one command future under the operation timeout.
    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = redis::RedisResult<T>>,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(|e| {
                warn!(op, error = %e, "Redis command failed");
                StoreError::from(e)
            }),
            Err(_) => {
                warn!(op, timeout_ms = self.op_timeout.as_millis(), "Redis command timed out");
                Err(StoreError::Unreachable(format!("redis {} timed out", op)))
            }
        }
    }
}

#[async_trait]
impl KeyedTtlStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, namespace: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let key = Self::namespace_key(namespace);
        self.bounded("HGET", conn.hget(&key, field)).await
    }

    async fn set(
        &self,
        namespace: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let key = Self::namespace_key(namespace);
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset(&key, field, value)
            .ignore()
            .pexpire(&key, Self::ttl_millis(ttl))
            .ignore();
        self.bounded("HSET", pipe.query_async(&mut conn)).await
    }

    async fn delete(&self, namespace: &str, field: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let key = Self::namespace_key(namespace);
        self.bounded("HDEL", conn.hdel(&key, field)).await
    }

    async fn list_keys(&self, namespace: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let key = Self::namespace_key(namespace);
        let mut keys: Vec<String> = self.bounded("HKEYS", conn.hkeys(&key)).await?;
        keys.sort();
        Ok(keys)
    }

    async fn copy_namespace(&self, src: &str, dst: &str, ttl: Duration) -> StoreResult<usize> {
        let mut conn = self.conn.clone();
        let src_key = Self::namespace_key(src);
        let snapshot: HashMap<String, String> =
            self.bounded("HGETALL", conn.hgetall(&src_key)).await?;
        if snapshot.is_empty() || src == dst {
            return Ok(snapshot.len());
        }

        // MULTI/EXEC: either every field lands in dst with the new TTL or none do.
        let dst_key = Self::namespace_key(dst);
        let fields: Vec<(String, String)> = snapshot.into_iter().collect();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(&dst_key, &fields[..])
            .ignore()
            .pexpire(&dst_key, Self::ttl_millis(ttl))
            .ignore();
        self.bounded::<()>("COPY", pipe.query_async(&mut conn)).await?;
        Ok(fields.len())
    }

    async fn increment(
        &self,
        namespace: &str,
        field: &str,
        delta: i64,
        ttl: Duration,
    ) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        let key = Self::namespace_key(namespace);
        let mut invocation = self.increment.key(&key);
        invocation.arg(field).arg(delta).arg(Self::ttl_millis(ttl));
        let result: redis::RedisResult<i64> =
            tokio::time::timeout(self.op_timeout, invocation.invoke_async(&mut conn))
                .await
                .map_err(|_| StoreError::Unreachable("redis HINCRBY timed out".to_string()))?;
        match result {
            Ok(value) => Ok(value),
            // HINCRBY on a non-integer value fails and leaves both value and TTL unchanged.
            Err(e) if matches!(
                e.kind(),
                redis::ErrorKind::ResponseError
                    | redis::ErrorKind::ExtensionError
                    | redis::ErrorKind::TypeError
            ) =>
            {
                Err(StoreError::NotAnInteger { field: field.to_string() })
            }
            Err(e) => Err(StoreError::from(e)),
        }
    }

    async fn list_namespaces(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}:*", KEY_PREFIX);
        let prefix_len = KEY_PREFIX.len() + 1;
        let scan = async {
            let mut iter = conn.scan_match::<_, String>(&pattern).await?;
            let mut ids = Vec::new();
            while let Some(key) = iter.next_item().await {
                if let Some(id) = key.get(prefix_len..) {
                    ids.push(id.to_string());
                }
            }
            Ok::<_, redis::RedisError>(ids)
        };
        let mut ids: Vec<String> = self.bounded("SCAN", scan).await?;
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let pong: String = self.bounded("PING", redis::cmd("PING").query_async(&mut conn)).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Unreachable(format!("unexpected PING reply: {}", pong)))
        }
    }
}
