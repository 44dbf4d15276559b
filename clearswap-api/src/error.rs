//! API error handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use clearswap_core::SwapError;

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Conflict error (version mismatch).
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// Service unavailable (no authenticated clearnode session).
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// Internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

/// Error response body: `{"success": false, "error": ".."}`.
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            success: false,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<SwapError> for ApiError {
    fn from(err: SwapError) -> Self {
        match &err {
            SwapError::NotFound(_) => ApiError::not_found(err.to_string()),
            SwapError::Validation(_) | SwapError::Json(_) | SwapError::Hex(_) => {
                ApiError::bad_request(err.to_string())
            }
            SwapError::VersionConflict { .. } => ApiError::conflict(err.to_string()),
            SwapError::NotAuthenticated => ApiError::unavailable(err.to_string()),
            _ => {
                tracing::error!(error = %err, "downstream failure");
                ApiError::internal(err.to_string())
            }
        }
    }
}
