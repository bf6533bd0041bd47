use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use crate::storage::StorageError;

/// Request-scoped error. Each variant ends one upload and nothing else.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Malformed request body: {0}")]
    BadBody(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::LimitExceeded { limit } => AppError::PayloadTooLarge(format!(
                "File size exceeds maximum limit of {} bytes",
                limit
            )),
            StorageError::InvalidFilename(e) => AppError::BadRequest(e.message().to_string()),
            StorageError::Body(msg) => AppError::BadBody(msg),
            other => AppError::Storage(other),
        }
    }
}

/// Convert `AppError` into an HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::BadBody(msg) => (StatusCode::BAD_REQUEST, msg),
            // Logged by the handler, which knows the filename; the client
            // never sees backend detail
            AppError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to store file".to_string(),
            ),
        };

        let body = Json(json!({"error": error_message}));
        (status, body).into_response()
    }
}

/// Startup failure. The only error kind allowed to end the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Plugin {name} not exist, available plugins: {}", .available.join(", "))]
    UnknownBackend {
        name: String,
        available: Vec<&'static str>,
    },

    #[error("Failed to initialize {backend} storage: {source}")]
    Backend {
        backend: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}
