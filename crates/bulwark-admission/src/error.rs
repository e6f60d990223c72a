//! Admission control errors.
//!
//! Denials are not errors: they come back as decisions with `allowed: false`.
//! These variants cover bad input and backend trouble only.

use bulwark_storage::StorageError;

/// Errors from the rate limiter and quota tracker.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// Reading or writing admission state failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The named plan tier is not configured.
    #[error("unknown plan: {0}")]
    UnknownPlan(String),

    /// A plan's parameters are unusable.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// A request field is missing or out of range.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Optimistic quota updates kept colliding with concurrent writers.
    #[error("quota update for {date} still contended after {attempts} attempts")]
    Contention {
        /// Quota day being updated.
        date: String,
        /// Attempts made.
        attempts: u32,
    },
}

impl AdmissionError {
    /// Whether the error was caused by the caller's input.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownPlan(_) | Self::InvalidPlan(_) | Self::InvalidRequest(_)
        )
    }
}

/// Result type for admission control.
pub type AdmissionResult<T> = Result<T, AdmissionError>;
