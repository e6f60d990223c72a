//! Telemetry error types.

use thiserror::Error;

/// Errors raised while installing the logging subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The level or a directive could not be parsed.
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),

    /// A subscriber is already installed, or installation failed.
    #[error("failed to initialize logging: {0}")]
    Init(String),

    /// The log directory could not be created.
    #[error("log directory error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
