//! Error types and HTTP error response handling.
//!
//! This module defines the errors a request can fail with and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Input Errors**: missing or malformed request data
/// - **Upstream Errors**: the inference service or blob storage failed
/// - **Authentication Errors**: bad admin credentials or session token
/// - **Internal Errors**: record store or local staging failures
///
/// Metering problems are not represented here. They never reach a caller
/// (see `services::metering::MeterOutcome`).
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request. The String is safe to show to the caller.
    #[error("{0}")]
    InvalidRequest(String),

    /// The background-removal service failed or returned an unusable payload.
    ///
    /// Returns HTTP 502 Bad Gateway. The detail is logged, not returned.
    #[error("Background removal failed: {0}")]
    InferenceFailed(String),

    /// An artifact upload to blob storage failed.
    ///
    /// Returns HTTP 502 Bad Gateway. The detail is logged, not returned.
    #[error("Artifact storage failed: {0}")]
    StorageFailed(String),

    /// Missing or invalid admin credentials or session token.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Unauthorized")]
    Unauthorized,

    /// Record store operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Writing or reading a staged upload failed.
    #[error("Staging error: {0}")]
    Staging(#[from] std::io::Error),

    /// A server-side condition the caller cannot correct.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code included in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::InferenceFailed(_) => "inference_failed",
            AppError::StorageFailed(_) => "storage_failed",
            AppError::Unauthorized => "unauthorized",
            AppError::Database(_) | AppError::Staging(_) | AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InferenceFailed(_) | AppError::StorageFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Database(_) | AppError::Staging(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "success": false,
///   "error": "Human-readable error message",
///   "code": "error_type"
/// }
/// ```
///
/// Only `InvalidRequest` and `Unauthorized` carry their own message. Everything else is
/// logged here and answered with a generic message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::InvalidRequest(msg) => msg.clone(),
            AppError::Unauthorized => self.to_string(),
            AppError::InferenceFailed(_) => {
                tracing::error!(error = %self, "request failed upstream");
                "AI Processing Failed".to_string()
            }
            AppError::StorageFailed(_) => {
                tracing::error!(error = %self, "request failed upstream");
                "Failed to store image".to_string()
            }
            AppError::Database(_) | AppError::Staging(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "request failed internally");
                "An internal error occurred".to_string()
            }
        };

        let body = Json(json!({
            "success": false,
            "error": message,
            "code": self.code(),
        }));

        (self.status(), body).into_response()
    }
}
