//! The cache client and its read-through strategies.
//!
//! ## Strategy selection
//!
//! ```text
//! read request → get_with_pass_through   → tolerate concurrent loads, never serve stale
//!              → get_with_mutex          → one load per key, readers wait for it
//!              → get_with_logical_expire → never wait, serve stale during rebuild
//! ```
//!
//! All three share one key convention: data at `<prefix><id>`, the rebuild
//! lock at `lock:<prefix><id>`. Callers must keep prefixes collision-free
//! across entity types.
//!
//! A present-but-empty value is a negative-cache tombstone: the id was
//! looked up, the store of record had nothing, and repeat lookups are
//! absorbed until the tombstone expires. This is distinct from an absent
//! key, which means the id was never looked up (or the entry expired).

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cacheguard_store::DynKvStore;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::CacheConfig;
use crate::envelope::Envelope;
use crate::error::{CacheError, CacheResult, LoaderError};
use crate::lock::DistributedLock;
use crate::rebuild::RebuildPool;

/// Outcome of a cache read before any loader is consulted.
enum CachedLookup<T> {
    /// A non-blank value deserialized to the payload type.
    Hit(T),
    /// A present-but-blank value: confirmed absent, loader must not run.
    Tombstone,
    /// No key at all.
    Miss,
}

/// Read-through cache façade over a key-value store.
///
/// The client holds a shared store handle, the injected [`CacheConfig`],
/// and the background [`RebuildPool`] used by the logical-expiration
/// strategy.
pub struct CacheClient {
    store: DynKvStore,
    config: CacheConfig,
    rebuild_pool: RebuildPool,
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CacheClient {
    /// Create a new client.
    ///
    /// Must be called from within a Tokio runtime: the rebuild workers are
    /// spawned immediately.
    pub fn new(store: DynKvStore, config: CacheConfig) -> Self {
        let rebuild_pool = RebuildPool::new(config.rebuild_workers, config.rebuild_queue_depth);
        Self {
            store,
            config,
            rebuild_pool,
        }
    }

    /// The underlying store handle.
    pub fn store(&self) -> &DynKvStore {
        &self.store
    }

    /// Serialize `value` and store it at `key` with a store-level TTL.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        let json = serde_json::to_string(value)?;
        self.store.set(key, &json, Some(ttl)).await?;
        Ok(())
    }

    /// Wrap `value` in an [`Envelope`] expiring at `now + ttl` and store it
    /// with no store-level TTL.
    ///
    /// Only [`get_with_logical_expire`](Self::get_with_logical_expire) can
    /// read entries written this way.
    pub async fn set_with_logical_expire<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        let envelope = Envelope::new(value, ttl);
        let json = serde_json::to_string(&envelope)?;
        self.store.set(key, &json, None).await?;
        Ok(())
    }

    /// Delete the data key for `prefix`/`id`.
    ///
    /// The documented update path: write the store of record first, then
    /// invalidate here. Cache and store of record stay eventually
    /// consistent; there is no fenced transaction across the two.
    pub async fn invalidate<K: Display>(&self, prefix: &str, id: K) -> CacheResult<()> {
        let key = format!("{prefix}{id}");
        self.store.delete(&key).await?;
        tracing::debug!(key = %key, "cache entry invalidated");
        Ok(())
    }

    /// Pre-warm `prefix`/`id` for the logical-expiration strategy.
    ///
    /// Loads through `loader` and writes a fresh envelope. Warming an id
    /// the store of record does not have is a caller bug and surfaces as
    /// [`CacheError::WarmMissing`].
    pub async fn warm<K, T, F, Fut>(
        &self,
        prefix: &str,
        id: K,
        ttl: Duration,
        loader: F,
    ) -> CacheResult<()>
    where
        K: Display,
        T: Serialize,
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<Option<T>, LoaderError>>,
    {
        let key = format!("{prefix}{id}");
        let Some(value) = loader(id).await.map_err(CacheError::Loader)? else {
            return Err(CacheError::warm_missing(key));
        };
        self.set_with_logical_expire(&key, &value, ttl).await?;
        tracing::debug!(key = %key, "cache entry warmed");
        Ok(())
    }

    /// Read-through lookup with negative caching and no locking.
    ///
    /// - non-blank hit: deserialize and return
    /// - tombstone hit: return `None` without invoking the loader
    /// - miss: invoke the loader; `None` writes a tombstone with the short
    ///   configured `null_ttl` (independent of `ttl`), `Some` is stored
    ///   with `ttl`
    ///
    /// Concurrent misses may all invoke the loader: acceptable stampede
    /// exposure in exchange for the simplest read path.
    pub async fn get_with_pass_through<K, T, F, Fut>(
        &self,
        prefix: &str,
        id: K,
        ttl: Duration,
        loader: F,
    ) -> CacheResult<Option<T>>
    where
        K: Display,
        T: Serialize + DeserializeOwned,
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<Option<T>, LoaderError>>,
    {
        let key = format!("{prefix}{id}");
        match self.lookup(&key).await? {
            CachedLookup::Hit(value) => Ok(Some(value)),
            CachedLookup::Tombstone => Ok(None),
            CachedLookup::Miss => {
                let loaded = loader(id).await.map_err(CacheError::Loader)?;
                self.write_back(&key, loaded, ttl).await
            }
        }
    }

    /// Read-through lookup where at most one caller per key, across all
    /// processes sharing the store, loads from the store of record.
    ///
    /// Hit and tombstone behavior match
    /// [`get_with_pass_through`](Self::get_with_pass_through). On a miss
    /// the caller races for `lock:<prefix><id>`; the winner performs a
    /// single load under the lock and releases it whatever the outcome,
    /// losers re-run the lookup after `lock_retry_delay`. The wait is
    /// bounded by `lock_retry_limit`, after which
    /// [`CacheError::LockContention`] surfaces instead of looping forever
    /// under sustained contention.
    pub async fn get_with_mutex<K, T, F, Fut>(
        &self,
        prefix: &str,
        id: K,
        ttl: Duration,
        loader: F,
    ) -> CacheResult<Option<T>>
    where
        K: Display,
        T: Serialize + DeserializeOwned,
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<Option<T>, LoaderError>>,
    {
        let key = format!("{prefix}{id}");
        let mut attempts = 0u32;
        loop {
            match self.lookup(&key).await? {
                CachedLookup::Hit(value) => return Ok(Some(value)),
                CachedLookup::Tombstone => return Ok(None),
                CachedLookup::Miss => {}
            }

            let lock = DistributedLock::new(Arc::clone(&self.store), &key);
            if lock.try_lock(self.config.lock_ttl()).await? {
                // Single load under the held lock; release happens whatever
                // the loader did.
                let result = async {
                    let loaded = loader(id).await.map_err(CacheError::Loader)?;
                    self.write_back(&key, loaded, ttl).await
                }
                .await;
                if let Err(e) = lock.unlock().await {
                    tracing::warn!(key = %key, error = %e, "failed to release rebuild lock");
                }
                return result;
            }

            attempts += 1;
            if attempts > self.config.lock_retry_limit {
                tracing::warn!(key = %key, attempts, "gave up waiting for rebuild lock");
                return Err(CacheError::lock_contention(key));
            }
            tokio::time::sleep(self.config.lock_retry_delay()).await;
        }
    }

    /// Non-blocking lookup over logically expiring entries.
    ///
    /// Entries must have been written by
    /// [`set_with_logical_expire`](Self::set_with_logical_expire) or
    /// [`warm`](Self::warm); a cold key returns `None` without ever
    /// invoking the loader, keeping the read path free of backing-store
    /// latency.
    ///
    /// An expired envelope is served stale immediately. If this reader
    /// wins `lock:<prefix><id>` it also submits a rebuild to the worker
    /// pool: load, wrap in a fresh envelope at `now + ttl`, persist, and
    /// unlock. A rebuild failure is logged and swallowed; the stale value
    /// stays for the next cycle. Losing the lock (or a full rebuild queue)
    /// means someone else is rebuilding, or will be; the stale value is
    /// returned either way.
    pub async fn get_with_logical_expire<K, T, F, Fut>(
        &self,
        prefix: &str,
        id: K,
        ttl: Duration,
        loader: F,
    ) -> CacheResult<Option<T>>
    where
        K: Send + 'static,
        K: Display,
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, LoaderError>> + Send + 'static,
    {
        let key = format!("{prefix}{id}");
        let Some(json) = self.store.get(&key).await? else {
            tracing::debug!(key = %key, "cache miss; logical-expire keys are warmed out of band");
            return Ok(None);
        };
        if json.is_empty() {
            return Ok(None);
        }

        let envelope: Envelope<T> = serde_json::from_str(&json)?;
        if !envelope.is_expired() {
            return Ok(Some(envelope.data));
        }

        let lock = Arc::new(DistributedLock::new(Arc::clone(&self.store), &key));
        if lock.try_lock(self.config.lock_ttl()).await? {
            let store = Arc::clone(&self.store);
            let job_lock = Arc::clone(&lock);
            let job_key = key.clone();
            let submitted = self
                .rebuild_pool
                .try_submit(async move { rebuild(store, job_lock, job_key, id, ttl, loader).await });
            if !submitted {
                tracing::warn!(key = %key, "rebuild queue full; skipping rebuild");
                if let Err(e) = lock.unlock().await {
                    tracing::warn!(key = %key, error = %e, "failed to release rebuild lock");
                }
            }
        }

        Ok(Some(envelope.data))
    }

    /// Classify the stored value at `key`.
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> CacheResult<CachedLookup<T>> {
        match self.store.get(key).await? {
            Some(json) if !json.is_empty() => {
                tracing::debug!(key = %key, "cache hit");
                Ok(CachedLookup::Hit(serde_json::from_str(&json)?))
            }
            Some(_) => {
                tracing::debug!(key = %key, "negative-cache hit");
                Ok(CachedLookup::Tombstone)
            }
            None => {
                tracing::debug!(key = %key, "cache miss");
                Ok(CachedLookup::Miss)
            }
        }
    }

    /// Store a loader result: `Some` under the caller's TTL, `None` as a
    /// short-lived tombstone.
    async fn write_back<T: Serialize>(
        &self,
        key: &str,
        loaded: Option<T>,
        ttl: Duration,
    ) -> CacheResult<Option<T>> {
        match loaded {
            None => {
                self.store
                    .set(key, "", Some(self.config.null_ttl()))
                    .await?;
                tracing::debug!(key = %key, "stored tombstone for missing value");
                Ok(None)
            }
            Some(value) => {
                let json = serde_json::to_string(&value)?;
                self.store.set(key, &json, Some(ttl)).await?;
                tracing::debug!(key = %key, "stored loaded value");
                Ok(Some(value))
            }
        }
    }
}

/// Background rebuild of a logically expired entry. Runs on the pool;
/// every outcome is absorbed here so nothing propagates into a worker.
async fn rebuild<K, T, F, Fut>(
    store: DynKvStore,
    lock: Arc<DistributedLock>,
    key: String,
    id: K,
    ttl: Duration,
    loader: F,
) where
    T: Serialize + Sync,
    F: FnOnce(K) -> Fut,
    Fut: Future<Output = Result<Option<T>, LoaderError>>,
{
    match loader(id).await {
        Ok(Some(value)) => {
            let envelope = Envelope::new(&value, ttl);
            match serde_json::to_string(&envelope) {
                Ok(json) => {
                    if let Err(e) = store.set(&key, &json, None).await {
                        tracing::warn!(key = %key, error = %e, "failed to persist rebuilt entry");
                    } else {
                        tracing::debug!(key = %key, "rebuilt cache entry");
                    }
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "failed to serialize rebuilt entry");
                }
            }
        }
        Ok(None) => {
            // The id vanished from the store of record since the entry was
            // warmed; drop the stale entry so readers converge on not-found.
            if let Err(e) = store.delete(&key).await {
                tracing::warn!(key = %key, error = %e, "failed to drop entry for vanished id");
            } else {
                tracing::debug!(key = %key, "dropped entry for vanished id");
            }
        }
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "rebuild loader failed; stale value stays");
        }
    }

    if let Err(e) = lock.unlock().await {
        tracing::warn!(key = %lock.key(), error = %e, "failed to release rebuild lock");
    }
}
