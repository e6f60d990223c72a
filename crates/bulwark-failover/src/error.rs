//! Failover errors.

use bulwark_sql::SqlError;

/// Failure reported by a primary store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrimaryError {
    /// The primary refused the write because a rate or usage limit was hit.
    #[error("primary limit reached (status {status}): {message}")]
    Limited {
        /// HTTP status, or 200 when the limit was reported in the body.
        status: u16,
        /// Primary's message.
        message: String,
    },

    /// The primary rejected the write for another reason.
    #[error("primary error (status {status}): {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Primary's message.
        message: String,
    },

    /// The request never got a response.
    #[error("primary unreachable: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("unexpected primary response: {0}")]
    InvalidResponse(String),
}

impl PrimaryError {
    /// Whether this failure should trip failover.
    #[must_use]
    pub fn is_limit(&self) -> bool {
        matches!(self, Self::Limited { .. })
    }
}

/// Errors from the failover router.
#[derive(Debug, thiserror::Error)]
pub enum FailoverError {
    /// The primary failed with a non-limit error. Failover was not tripped.
    #[error(transparent)]
    Primary(#[from] PrimaryError),

    /// The document store fallback failed.
    #[error("fallback write failed: {0}")]
    Fallback(#[from] SqlError),

    /// A primary client could not be built.
    #[error("invalid primary configuration: {0}")]
    Config(String),
}

/// Result type for failover operations.
pub type FailoverResult<T> = Result<T, FailoverError>;
