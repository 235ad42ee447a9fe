//! The store trait all key-value backends implement.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// The key-value operations the cache layer consumes.
///
/// Implementations must be thread-safe (`Send + Sync`). The two atomic
/// operations, [`set_if_absent`](KvStore::set_if_absent) and
/// [`delete_if_equals`](KvStore::delete_if_equals), carry the mutual
/// exclusion guarantees of the distributed lock; an implementation that
/// cannot provide them atomically must not implement this trait.
///
/// # Example
///
/// ```ignore
/// use cacheguard_store::{DynKvStore, StoreError};
///
/// async fn read_raw(store: &DynKvStore, key: &str) -> Result<Option<String>, StoreError> {
///     store.get(key).await
/// }
/// ```
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads the raw value stored at `key`.
    ///
    /// Returns `None` when the key is absent or expired. An empty string is
    /// a stored value like any other; callers relying on negative caching
    /// depend on this distinction.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes `value` at `key`, replacing any previous value.
    ///
    /// `ttl: None` stores without expiry; the entry lives until deleted or
    /// overwritten.
    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Atomically writes `value` at `key` only if the key is absent.
    ///
    /// Returns whether this call was the one to set it.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Deletes `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically deletes `key` only if it currently holds `expected`.
    ///
    /// Returns whether the key was deleted. The compare and the delete
    /// happen as one step on the backend; there is no window in which the
    /// key can be replaced between them.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError>;
}
