//! HTTP error responses
//!
//! Every failure is returned as `{"error": {"code", "message"}}`, plus a
//! `duplicates` list for DUPLICATES_FOUND.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use setlist_common::DuplicateSong;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Uniqueness violation (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Songs already used elsewhere in the setlist (409)
    #[error("Duplicate songs found")]
    DuplicatesFound(Vec<DuplicateSong>),

    /// Missing or invalid bearer token (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient access (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<setlist_common::Error> for ApiError {
    fn from(err: setlist_common::Error) -> Self {
        use setlist_common::Error;

        match err {
            Error::NotFound(_) => ApiError::NotFound(err.user_message()),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            Error::DuplicatesFound(duplicates) => ApiError::DuplicatesFound(duplicates),
            Error::Unauthorized(msg) => ApiError::Unauthorized(msg),
            Error::Forbidden(msg) => ApiError::Forbidden(msg),
            Error::Database(sqlx::Error::RowNotFound) => ApiError::NotFound(err.user_message()),
            Error::Database(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                ApiError::Conflict(err.user_message())
            }
            other => {
                error!(error = %other, "Request failed");
                ApiError::Internal(other.user_message())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiError::DuplicatesFound(duplicates) => (
                StatusCode::CONFLICT,
                "DUPLICATES_FOUND",
                setlist_common::Error::DuplicatesFound(duplicates.clone()).user_message(),
            ),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        let mut error = json!({
            "code": error_code,
            "message": message,
        });
        if let ApiError::DuplicatesFound(duplicates) = self {
            error["duplicates"] = json!(duplicates);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
