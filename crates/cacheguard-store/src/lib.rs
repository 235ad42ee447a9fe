//! # cacheguard-store
//!
//! Key-value store abstraction for the cacheguard cache façade.
//!
//! This crate defines the [`KvStore`] trait (the five operations the cache
//! layer consumes) together with the two shipped implementations:
//!
//! - [`MemoryStore`]: in-process DashMap store, microsecond latency,
//!   per-instance. Used for single-instance deployments and tests.
//! - [`RedisStore`]: Redis-backed store, millisecond latency, shared across
//!   instances.
//!
//! ## Graceful Degradation
//!
//! [`create_store`] builds a store from a [`StoreConfig`]. If Redis is
//! disabled or unreachable it falls back to the in-memory store, so callers
//! can start and run without Redis at the cost of losing cross-process
//! sharing (and cross-process lock safety).
//!
//! ## Example
//!
//! ```ignore
//! use cacheguard_store::{KvStore, MemoryStore};
//! use std::time::Duration;
//!
//! # futures::executor::block_on(async {
//! let store = MemoryStore::new();
//! store.set("greeting", "hello", Some(Duration::from_secs(60))).await?;
//! assert_eq!(store.get("greeting").await?, Some("hello".to_string()));
//! # Ok::<(), cacheguard_store::StoreError>(())
//! # });
//! ```

mod config;
mod error;
mod memory;
mod redis_store;
mod traits;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use traits::KvStore;

use std::sync::Arc;
use std::time::Duration;

/// Type alias for a shared store trait object.
pub type DynKvStore = Arc<dyn KvStore>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use cacheguard_store::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::StoreConfig;
    pub use crate::error::{StoreError, StoreResult};
    pub use crate::memory::MemoryStore;
    pub use crate::redis_store::RedisStore;
    pub use crate::traits::KvStore;
    pub use crate::{DynKvStore, create_store};
}

/// Create a key-value store based on configuration.
///
/// ## Modes
///
/// - **Redis disabled**: returns the in-memory store
/// - **Redis enabled**: attempts to connect to Redis, falls back to the
///   in-memory store on failure
///
/// The fallback keeps a single instance functional when Redis is down, but
/// note that locks taken against an in-memory store only exclude tasks in
/// the same process.
pub async fn create_store(config: &StoreConfig) -> DynKvStore {
    if !config.redis_enabled {
        tracing::info!("Redis disabled, using in-memory store");
        return Arc::new(MemoryStore::new());
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    if let Some(ref mut pool_config) = redis_config.pool {
        pool_config.max_size = config.pool_size;
        pool_config.timeouts.wait = Some(Duration::from_millis(config.timeout_ms));
        pool_config.timeouts.create = Some(Duration::from_millis(config.timeout_ms));
        pool_config.timeouts.recycle = Some(Duration::from_millis(config.timeout_ms));
    }

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to in-memory store."
            );
            return Arc::new(MemoryStore::new());
        }
    };

    match pool.get().await {
        Ok(_) => {
            tracing::info!("Connected to Redis");
            Arc::new(RedisStore::new(pool))
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to in-memory store."
            );
            Arc::new(MemoryStore::new())
        }
    }
}
