//! Distributed rebuild lock.
//!
//! A named, TTL-bounded mutual-exclusion token in the key-value store.
//! Acquisition is an atomic set-if-absent; release is an identity-checked
//! atomic check-and-delete, so a holder whose lock expired and was
//! re-acquired by another process can never delete that process's lock.
//! The TTL is the safety net against crashed holders, not the normal
//! release path.

use std::time::Duration;

use cacheguard_store::{DynKvStore, StoreError};
use uuid::Uuid;

/// Key prefix for lock entries; data key `shop:1` locks under `lock:shop:1`.
pub const LOCK_KEY_PREFIX: &str = "lock:";

/// A handle on a named distributed lock.
///
/// Each handle carries its own holder token, so the handle uniquely
/// identifies the acquiring execution context. Dropping the handle without
/// calling [`unlock`](DistributedLock::unlock) leaves the lock to expire
/// via its TTL.
pub struct DistributedLock {
    store: DynKvStore,
    key: String,
    token: String,
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("key", &self.key)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl DistributedLock {
    /// Create a handle for the lock named `name`.
    ///
    /// No store traffic happens until [`try_lock`](DistributedLock::try_lock).
    pub fn new(store: DynKvStore, name: impl AsRef<str>) -> Self {
        Self {
            store,
            key: format!("{LOCK_KEY_PREFIX}{}", name.as_ref()),
            token: Uuid::new_v4().simple().to_string(),
        }
    }

    /// The full store key of this lock.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Attempt to acquire the lock for at most `ttl`.
    ///
    /// Returns whether this call was the one to acquire it. Never blocks;
    /// contention handling (retry or skip) is the caller's policy.
    pub async fn try_lock(&self, ttl: Duration) -> Result<bool, StoreError> {
        let acquired = self.store.set_if_absent(&self.key, &self.token, ttl).await?;
        if acquired {
            tracing::debug!(key = %self.key, "acquired rebuild lock");
        }
        Ok(acquired)
    }

    /// Release the lock if this handle still holds it.
    ///
    /// Returns `false` (a no-op, never an error) when the lock has
    /// already expired, or expired and been re-acquired by another holder.
    pub async fn unlock(&self) -> Result<bool, StoreError> {
        let released = self.store.delete_if_equals(&self.key, &self.token).await?;
        if released {
            tracing::debug!(key = %self.key, "released rebuild lock");
        } else {
            tracing::debug!(key = %self.key, "lock expired or held by another owner; nothing released");
        }
        Ok(released)
    }
}
