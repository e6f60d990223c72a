//! Storage error types.

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested document or key was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A create targeted an identifier that is already taken.
    #[error("document already exists: {collection}/{id}")]
    AlreadyExists {
        /// Collection the write targeted.
        collection: String,
        /// Identifier that collided.
        id: String,
    },

    /// A storage operation failed.
    #[error("storage error: {0}")]
    Internal(String),

    /// The storage backend is unreachable or refused the connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The collection, identifier or key is invalid.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// An argument was outside its accepted range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A batch exceeded the backend's per-commit operation limit.
    #[error("batch of {size} operations exceeds the limit of {max}")]
    BatchTooLarge {
        /// Number of operations submitted.
        size: usize,
        /// Maximum operations per commit.
        max: usize,
    },
}

impl StorageError {
    /// Whether this error reports a uniqueness violation.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
