//! Error types for the gateway.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bulwark_admission::AdmissionError;
use bulwark_storage::StorageError;
use thiserror::Error;

/// Errors raised while assembling or running the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration could not be loaded or converted.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage setup failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Admission components rejected their configuration.
    #[error("admission error: {0}")]
    Admission(#[from] AdmissionError),

    /// The primary client could not be built.
    #[error("failover error: {0}")]
    Failover(#[from] bulwark_failover::FailoverError),

    /// Socket error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bulwark_config::ConfigError> for GatewayError {
    fn from(e: bulwark_config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

// ---------------------------------------------------------------------------
// HTTP errors
// ---------------------------------------------------------------------------

/// An error answered as `{ "error": message }` with a status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// `400 Bad Request`.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// `404 Not Found`.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    /// `500 Internal Server Error`.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// Status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), error = %self.message, "Request failed");
        }
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

impl From<AdmissionError> for ApiError {
    fn from(e: AdmissionError) -> Self {
        match e {
            e if e.is_client_error() => Self::bad_request(e.to_string()),
            AdmissionError::Contention { .. } => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: e.to_string(),
            },
            AdmissionError::Storage(e) => Self::from(e),
            e => Self::internal(e.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidKey(_) | StorageError::InvalidArgument(_) => {
                Self::bad_request(e.to_string())
            },
            StorageError::NotFound(_) => Self::not_found(e.to_string()),
            e => Self::internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::bad_request(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::bad_request(e.body_text())
    }
}
