//! Firestore error types.

use thiserror::Error;

use dscan_models::StatusTransitionError;

/// Result type for Firestore operations.
pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Errors that can occur during Firestore operations.
#[derive(Debug, Error)]
pub enum FirestoreError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error(transparent)]
    InvalidTransition(#[from] StatusTransitionError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FirestoreError {
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Classify a non-success HTTP answer.
    pub fn from_http_status(status: u16, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match status {
            401 => Self::AuthError(msg),
            403 => Self::PermissionDenied(msg),
            404 => Self::NotFound(msg),
            409 => Self::AlreadyExists(msg),
            412 => Self::PreconditionFailed(msg),
            429 => Self::RateLimited(msg),
            400 if msg.contains("FAILED_PRECONDITION") => Self::PreconditionFailed(msg),
            500..=599 => Self::ServerError(status, msg),
            _ => Self::RequestFailed(msg),
        }
    }

    /// HTTP status this error corresponds to, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::AuthError(_) => Some(401),
            Self::PermissionDenied(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::AlreadyExists(_) => Some(409),
            Self::PreconditionFailed(_) => Some(412),
            Self::RateLimited(_) => Some(429),
            Self::ServerError(code, _) => Some(*code),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True if the error was caused by a failed precondition (e.g., updateTime mismatch).
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, FirestoreError::PreconditionFailed(_))
    }

    /// True if Firestore could not be reached or answered with a transport-level failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            FirestoreError::Network(_)
                | FirestoreError::ServerError(..)
                | FirestoreError::RateLimited(_)
                | FirestoreError::AuthError(_)
        )
    }
}

impl From<dscan_auth::AuthError> for FirestoreError {
    fn from(e: dscan_auth::AuthError) -> Self {
        Self::AuthError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status() {
        assert!(matches!(
            FirestoreError::from_http_status(409, "conflict"),
            FirestoreError::AlreadyExists(_)
        ));
        assert!(matches!(
            FirestoreError::from_http_status(404, "missing"),
            FirestoreError::NotFound(_)
        ));
        assert!(matches!(
            FirestoreError::from_http_status(503, "unavailable"),
            FirestoreError::ServerError(503, _)
        ));
        assert!(matches!(
            FirestoreError::from_http_status(400, "bad field"),
            FirestoreError::RequestFailed(_)
        ));
    }

    #[test]
    fn test_failed_precondition_body_is_classified() {
        let err = FirestoreError::from_http_status(
            400,
            r#"{"error":{"code":400,"status":"FAILED_PRECONDITION"}}"#,
        );
        assert!(err.is_precondition_failed());
        assert_eq!(err.http_status(), Some(412));
    }

    #[test]
    fn test_unavailable() {
        assert!(FirestoreError::ServerError(500, "x".into()).is_unavailable());
        assert!(FirestoreError::RateLimited("x".into()).is_unavailable());
        assert!(!FirestoreError::NotFound("x".into()).is_unavailable());
    }
}
