//! # Error Handling and Response Types
//!
//! Every handler failure becomes an [`AppError`], which renders as a JSON body
//! with a matching HTTP status:
//!
//! ```json
//! {
//!   "error": "chart not found: foo-1.0.0",
//!   "code": "not_found",
//!   "timestamp": "2024-01-01T12:00:00Z"
//! }
//! ```
//!
//! | Variant            | Status |
//! |--------------------|--------|
//! | `BadRequest`, `Multipart` | 400 |
//! | `RouteNotFound`, `NotFound` | 404 |
//! | `Conflict`         | 409 |
//! | `PayloadTooLarge`  | 413 |
//! | `Index`, `Storage`, `Internal` | 500 |

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chart_storage::StorageError;
use chrono::Utc;
use serde::Serialize;

use crate::index::IndexError;

/// JSON error body.
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: String,
    pub timestamp: String,
}

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    Conflict,
    UploadError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::UploadError => "upload_error",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::UploadError => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("route not found")]
    RouteNotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Multipart form parsing error: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("not found: {key}")),
            StorageError::InvalidKey(msg) => AppError::BadRequest(format!("invalid path: {msg}")),
            other => AppError::Storage(other),
        }
    }
}

impl AppError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::BadRequest(_) => ErrorCode::ValidationError,
            AppError::Multipart(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                ErrorCode::UploadError
            }
            AppError::Multipart(_) => ErrorCode::ValidationError,
            AppError::RouteNotFound | AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::PayloadTooLarge(_) => ErrorCode::UploadError,
            AppError::Index(_) | AppError::Storage(_) | AppError::Internal(_) => {
                ErrorCode::InternalError
            }
        }
    }

    pub fn to_error_response(&self) -> ApiErrorResponse {
        ApiErrorResponse {
            error: self.to_string(),
            code: self.error_code().as_str().to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = code.http_status();

        if code == ErrorCode::InternalError {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(status = %status, code = code.as_str(), error = %self, "Request rejected");
        }

        (status, axum::Json(self.to_error_response())).into_response()
    }
}

/// Result type for handler operations.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_to_client_statuses() {
        let not_found: AppError = StorageError::NotFound("foo.tgz".to_string()).into();
        assert_eq!(not_found.error_code().http_status(), StatusCode::NOT_FOUND);

        let invalid: AppError = StorageError::InvalidKey("../x".to_string()).into();
        assert_eq!(invalid.error_code().http_status(), StatusCode::BAD_REQUEST);

        let offline: AppError = StorageError::Unavailable("down".to_string()).into();
        assert_eq!(
            offline.error_code().http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn index_errors_are_internal() {
        let err = AppError::from(IndexError::NoIndexAvailable("offline".to_string()));
        assert_eq!(err.error_code(), ErrorCode::InternalError);
        assert!(err.to_string().contains("offline"));
    }

    #[test]
    fn error_body_carries_message_and_code() {
        let body = AppError::Conflict("chart exists".to_string()).to_error_response();
        assert_eq!(body.error, "chart exists");
        assert_eq!(body.code, "conflict");
    }

    #[test]
    fn route_not_found_is_404() {
        let response = AppError::RouteNotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
