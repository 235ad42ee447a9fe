//! # cacheguard
//!
//! A cache-stability façade over a key-value store.
//!
//! Two failure modes dominate read-heavy caches in front of a slower store
//! of record:
//!
//! - **Cache penetration**: repeated lookups of ids that exist nowhere,
//!   each punching through to the backing store.
//! - **Cache breakdown / stampede**: a hot key expiring and every
//!   concurrent reader rebuilding it at once.
//!
//! [`CacheClient`] offers three interchangeable read-through strategies
//! against them:
//!
//! | Strategy | Penetration | Stampede | Caller latency on expiry |
//! |----------|-------------|----------|--------------------------|
//! | [`get_with_pass_through`](CacheClient::get_with_pass_through) | negative caching | none (by design) | one load |
//! | [`get_with_mutex`](CacheClient::get_with_mutex) | negative caching | one load per key, cross-process | blocks until rebuilt |
//! | [`get_with_logical_expire`](CacheClient::get_with_logical_expire) | n/a (pre-warmed keys) | one background rebuild | none (serves stale) |
//!
//! The stampede guarantees rest on [`DistributedLock`], a TTL-bounded
//! mutual exclusion token in the key-value store with identity-checked
//! release. Background rebuilds run on a bounded [`RebuildPool`] so a burst
//! of expiries cannot overload the backing store.
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use cacheguard::{CacheClient, CacheConfig};
//! use cacheguard_store::{DynKvStore, MemoryStore};
//!
//! # async fn example() -> Result<(), cacheguard::CacheError> {
//! let store: DynKvStore = std::sync::Arc::new(MemoryStore::new());
//! let cache = CacheClient::new(store, CacheConfig::default());
//!
//! let user = cache
//!     .get_with_pass_through("user:", 42, Duration::from_secs(1800), |id| async move {
//!         fetch_user_from_db(id).await
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Writes to the store of record stay eventually consistent with the
//! cache: update the store of record first, then
//! [`invalidate`](CacheClient::invalidate) the key. There is no fenced
//! transaction across the two systems.

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod lock;
pub mod rebuild;

pub use client::CacheClient;
pub use config::CacheConfig;
pub use envelope::Envelope;
pub use error::{CacheError, CacheResult, LoaderError};
pub use lock::DistributedLock;
pub use rebuild::RebuildPool;
