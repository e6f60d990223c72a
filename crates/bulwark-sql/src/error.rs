//! SQL adapter errors.

use bulwark_storage::StorageError;

/// Errors from executing statements.
///
/// Compilation never produces an error; see [`compile`](crate::compile).
#[derive(Debug, thiserror::Error)]
pub enum SqlError {
    /// The backing store failed or is unreachable.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The statement names no table the adapter could target.
    #[error("statement has no target table: {0}")]
    MissingTable(String),

    /// A mutation's conditions were only partly understood.
    #[error("refusing to run {op} with a partially compiled statement: {sql}")]
    IncompleteMutation {
        /// Statement kind.
        op: String,
        /// Original SQL.
        sql: String,
    },

    /// A bound value cannot be used where it was placed.
    #[error("invalid value for parameter {index}: {message}")]
    InvalidParameter {
        /// Zero-based parameter position.
        index: usize,
        /// What was wrong with the value.
        message: String,
    },

    /// Some chunks of a chunked write failed. Earlier chunks stay committed.
    #[error(
        "{failed_chunks} of {total_chunks} batch chunks failed after {committed} changes: {message}"
    )]
    PartialBatch {
        /// Documents changed by the chunks that succeeded.
        committed: u64,
        /// Chunks that failed.
        failed_chunks: usize,
        /// Chunks attempted.
        total_chunks: usize,
        /// First failure.
        message: String,
    },
}

impl SqlError {
    /// Whether this error reports a uniqueness violation in the backing store.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_already_exists())
    }
}

/// Result type for SQL operations.
pub type SqlResult<T> = Result<T, SqlError>;
