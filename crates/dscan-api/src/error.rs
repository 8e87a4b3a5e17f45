//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dscan_firestore::FirestoreError;
use dscan_scanner::ScanError;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation(_) => "validation_error",
            ApiError::Conflict(_) => "conflict",
            ApiError::Upstream(_) => "upstream_error",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        let msg = e.to_string();
        match e {
            ScanError::InProgress
            | ScanError::NotRetryable { .. }
            | ScanError::RequeueNeedsRetry(_) => Self::Conflict(msg),
            ScanError::NotFound(_) => Self::NotFound(msg),
            ScanError::Config(_) => Self::Internal(msg),
            ScanError::Registry(FirestoreError::InvalidTransition(_))
            | ScanError::Registry(FirestoreError::PreconditionFailed(_)) => Self::Conflict(msg),
            ScanError::Registry(FirestoreError::NotFound(_)) => Self::NotFound(msg),
            ScanError::Source(_) | ScanError::Registry(_) | ScanError::Queue(_) => Self::Upstream(msg),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::Validation(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    detail: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Internal(_) | ApiError::Upstream(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            ok: false,
            detail,
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dscan_models::{JobStatus, StatusTransitionError};
    use dscan_tasks::TasksError;

    #[test]
    fn test_scan_error_mapping() {
        assert_eq!(ApiError::from(ScanError::InProgress).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(ScanError::RequeueNeedsRetry("x".into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ScanError::NotFound("x".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        let transition = StatusTransitionError {
            from: JobStatus::Done,
            to: JobStatus::Queued,
        };
        assert_eq!(
            ApiError::from(ScanError::Registry(transition.into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ScanError::Queue(TasksError::ServerError(503, "down".into()))).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
