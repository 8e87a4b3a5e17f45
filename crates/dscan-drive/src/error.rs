//! Drive error types.

use thiserror::Error;

pub type DriveResult<T> = Result<T, DriveError>;

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl DriveError {
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn from_http_status(status: u16, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match status {
            401 => Self::AuthError(msg),
            403 if msg.contains("rateLimitExceeded") || msg.contains("userRateLimitExceeded") => {
                Self::RateLimited(msg)
            }
            403 => Self::PermissionDenied(msg),
            404 => Self::NotFound(msg),
            429 => Self::RateLimited(msg),
            500..=599 => Self::ServerError(status, msg),
            _ => Self::RequestFailed(msg),
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::AuthError(_) => Some(401),
            Self::PermissionDenied(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::RateLimited(_) => Some(429),
            Self::ServerError(code, _) => Some(*code),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<dscan_auth::AuthError> for DriveError {
    fn from(e: dscan_auth::AuthError) -> Self {
        Self::AuthError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_rate_limit_uses_403() {
        let err = DriveError::from_http_status(403, r#"{"reason":"userRateLimitExceeded"}"#);
        assert!(matches!(err, DriveError::RateLimited(_)));
        let err = DriveError::from_http_status(403, "insufficientFilePermissions");
        assert!(matches!(err, DriveError::PermissionDenied(_)));
        assert_eq!(err.http_status(), Some(403));
    }
}
