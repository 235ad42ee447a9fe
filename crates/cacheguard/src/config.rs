//! Cache client configuration.
//!
//! Every knob the strategies use is injected here rather than living in
//! process-wide statics, so tests can run isolated clients with their own
//! pools and timings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for [`CacheClient`](crate::CacheClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL in seconds for negative-cache tombstones. Deliberately short and
    /// independent of the caller's TTL: a tombstone only has to absorb the
    /// burst of lookups for an id that does not exist.
    /// Default: 120
    #[serde(default = "default_null_ttl_secs")]
    pub null_ttl_secs: u64,

    /// TTL in seconds for rebuild locks; the safety net against crashed
    /// holders, not the normal release path.
    /// Default: 10
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Delay in milliseconds between lock acquisition attempts in the
    /// mutex strategy.
    /// Default: 50
    #[serde(default = "default_lock_retry_delay_ms")]
    pub lock_retry_delay_ms: u64,

    /// Maximum lock acquisition attempts in the mutex strategy before
    /// surfacing `LockContention`.
    /// Default: 100 (~5s of waiting at the default delay)
    #[serde(default = "default_lock_retry_limit")]
    pub lock_retry_limit: u32,

    /// Number of background rebuild workers. Caps concurrent backing-store
    /// load from logical-expiration rebuilds regardless of request volume.
    /// Default: 10
    #[serde(default = "default_rebuild_workers")]
    pub rebuild_workers: usize,

    /// Bounded depth of the rebuild queue. When full, new rebuilds are
    /// skipped (the triggering reader has already been served stale data).
    /// Default: 256
    #[serde(default = "default_rebuild_queue_depth")]
    pub rebuild_queue_depth: usize,
}

fn default_null_ttl_secs() -> u64 {
    120
}

fn default_lock_ttl_secs() -> u64 {
    10
}

fn default_lock_retry_delay_ms() -> u64 {
    50
}

fn default_lock_retry_limit() -> u32 {
    100
}

fn default_rebuild_workers() -> usize {
    10
}

fn default_rebuild_queue_depth() -> usize {
    256
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            null_ttl_secs: default_null_ttl_secs(),
            lock_ttl_secs: default_lock_ttl_secs(),
            lock_retry_delay_ms: default_lock_retry_delay_ms(),
            lock_retry_limit: default_lock_retry_limit(),
            rebuild_workers: default_rebuild_workers(),
            rebuild_queue_depth: default_rebuild_queue_depth(),
        }
    }
}

impl CacheConfig {
    /// Validate the configuration, returning a description of the first
    /// problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.null_ttl_secs == 0 {
            return Err("null_ttl_secs must be > 0".into());
        }
        if self.lock_ttl_secs == 0 {
            return Err("lock_ttl_secs must be > 0".into());
        }
        if self.rebuild_workers == 0 {
            return Err("rebuild_workers must be > 0".into());
        }
        if self.rebuild_queue_depth == 0 {
            return Err("rebuild_queue_depth must be > 0".into());
        }
        Ok(())
    }

    /// Negative-cache tombstone TTL.
    pub fn null_ttl(&self) -> Duration {
        Duration::from_secs(self.null_ttl_secs)
    }

    /// Rebuild lock TTL.
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    /// Delay between lock acquisition attempts.
    pub fn lock_retry_delay(&self) -> Duration {
        Duration::from_millis(self.lock_retry_delay_ms)
    }
}
