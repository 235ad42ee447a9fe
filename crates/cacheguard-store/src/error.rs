//! Error types for the key-value store abstraction.

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to obtain a connection to the backing store.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },

    /// The backing store failed or rejected an operation.
    #[error("Backend error: {0}")]
    Backend(#[from] redis::RedisError),
}

impl StoreError {
    /// Create a new Connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}

/// Convenience result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
