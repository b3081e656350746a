use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The persistence medium could not be read or written.
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Cannot sync while offline")]
    Offline,

    /// Batch or single write to the remote store failed or timed out.
    /// Nothing was marked synced.
    #[error("Remote write failed: {0}")]
    RemoteWriteFailed(String),

    #[error("Remote query failed: {0}")]
    Remote(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Offline => (StatusCode::CONFLICT, AppError::Offline.to_string()),
            AppError::StorageUnavailable(msg) => {
                error!("local storage unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    format!("Local storage unavailable: {}", msg),
                )
            }
            AppError::RemoteWriteFailed(msg) => {
                (StatusCode::BAD_GATEWAY, format!("Remote write failed: {}", msg))
            }
            AppError::Remote(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Database(e) => {
                error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                )
            }
            AppError::Serialization(e) => {
                error!("corrupt local record: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Stored records could not be read".to_string(),
                )
            }
            AppError::Config(msg) | AppError::Internal(msg) => {
                error!("internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            message: error_message,
        });

        (status, body).into_response()
    }
}
