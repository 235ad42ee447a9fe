//! Error types for cache operations.
//!
//! Not-found and negative-cache hits are not errors; strategies return
//! `Ok(None)` for both. Errors cover infrastructure failures (store,
//! serialization), loader failures bubbling up from the store of record,
//! and exhaustion of the bounded wait for the rebuild lock.

use cacheguard_store::StoreError;

/// Boxed error type for loader callbacks.
///
/// Loaders talk to an arbitrary store of record, so their failures are
/// carried opaquely and surfaced through [`CacheError::Loader`].
pub type LoaderError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The key-value store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A cached value or envelope could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The loader callback failed against the store of record.
    ///
    /// Cache state is untouched: values are only written after a
    /// successful load.
    #[error("Loader error: {0}")]
    Loader(#[source] LoaderError),

    /// The bounded wait for the rebuild lock was exhausted.
    #[error("Timed out waiting for rebuild lock on {key}")]
    LockContention {
        /// The data key whose rebuild lock stayed contended.
        key: String,
    },

    /// A warm-up loader returned no value for the requested id.
    #[error("Warm-up loader returned no value for {key}")]
    WarmMissing {
        /// The data key that was being warmed.
        key: String,
    },
}

impl CacheError {
    /// Wrap a loader failure.
    pub fn loader(source: impl Into<LoaderError>) -> Self {
        Self::Loader(source.into())
    }

    /// Create a new LockContention error.
    pub fn lock_contention(key: impl Into<String>) -> Self {
        Self::LockContention { key: key.into() }
    }

    /// Create a new WarmMissing error.
    pub fn warm_missing(key: impl Into<String>) -> Self {
        Self::WarmMissing { key: key.into() }
    }

    /// Whether retrying later may succeed without any intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_) | Self::LockContention { .. })
    }
}

/// Convenience result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
