//! Session handle implementation.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::recovery::{RecoveryCoordinator, ResumeOutcome};
use crate::store::{KeyedTtlStore, StoreError, StoreResult};

/// One session's view of the store.
///
/// Every write refreshes the whole namespace TTL; reads never do.
#[derive(Clone)]
pub struct SessionHandle {
    store: Arc<dyn KeyedTtlStore>,
    session_id: String,
    ttl: Duration,
}

impl SessionHandle {
    /// Bind `session_id` on `store` with the given write TTL.
    pub fn new(store: Arc<dyn KeyedTtlStore>, session_id: impl Into<String>, ttl: Duration) -> Self {
        Self { store, session_id: session_id.into(), ttl }
    }

    /// The namespace this handle addresses.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// TTL applied by every write.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read and decode a field.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the stored payload does not
    /// decode as `T`, or the store's error if the read fails.
    pub async fn get<T: DeserializeOwned>(&self, field: &str) -> StoreResult<Option<T>> {
        match self.store.get(&self.session_id, field).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::serialization(field, e)),
            None => Ok(None),
        }
    }

    /// Read a field, falling back to `T::default()` only when it is absent.
    ///
    /// # Errors
    ///
    /// Same as [`SessionHandle::get`]; a corrupt payload is never defaulted.
    pub async fn get_or_default<T: DeserializeOwned + Default>(&self, field: &str) -> StoreResult<T> {
        Ok(self.get(field).await?.unwrap_or_default())
    }

    /// Encode and write a field.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if `value` cannot be encoded, or
    /// the store's error if the write fails.
    pub async fn set<T: Serialize + ?Sized>(&self, field: &str, value: &T) -> StoreResult<()> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::serialization(field, e))?;
        self.store.set(&self.session_id, field, &raw, self.ttl).await
    }

    /// Remove a field.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the delete fails.
    pub async fn delete(&self, field: &str) -> StoreResult<()> {
        self.store.delete(&self.session_id, field).await
    }

    /// Atomically add `delta` to an integer field, returning the new value.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotAnInteger` if the field holds anything other
    /// than an integer.
    pub async fn increment(&self, field: &str, delta: i64) -> StoreResult<i64> {
        self.store.increment(&self.session_id, field, delta, self.ttl).await
    }

    /// Append `item` to a JSON list field and return the new length.
    ///
    /// This is a read-modify-write. Two concurrent appends to the same field
    /// can lose one item; list fields are only written by their own session.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the field holds something other
    /// than a list of `T`.
    pub async fn append_to_list<T>(&self, field: &str, item: T) -> StoreResult<usize>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        let mut items: Vec<T> = self.get_or_default(field).await?;
        items.push(item);
        self.set(field, &items).await?;
        Ok(items.len())
    }

    /// Names of every live field in this session.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the scan fails.
    pub async fn keys(&self) -> StoreResult<Vec<String>> {
        self.store.list_keys(&self.session_id).await
    }

    /// Resume from `previous_session_id` into this session.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the copy fails.
    pub async fn copy_from(&self, previous_session_id: &str) -> StoreResult<ResumeOutcome> {
        RecoveryCoordinator::new(self.store.clone(), self.ttl)
            .resume_session(&self.session_id, previous_session_id)
            .await
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
