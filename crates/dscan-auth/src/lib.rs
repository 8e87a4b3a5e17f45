//! Access tokens for Google REST APIs.
//!
//! Every outbound client (Firestore, Drive, Cloud Tasks) authorizes through an
//! [`AccessTokenProvider`]. Production code uses [`TokenCache`] on top of a
//! `gcp_auth` provider; tests use [`StaticToken`].

pub mod token_cache;

use async_trait::async_trait;
use thiserror::Error;

pub use token_cache::{default_provider, TokenCache};

/// OAuth scope for Firestore/Datastore access.
pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

/// Read-only Drive scope; the scanner never mutates files.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Cloud Tasks requires the broad platform scope.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Credentials unavailable: {0}")]
    Unavailable(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
}

/// Source of short-lived bearer tokens.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Return a token valid for at least the next request.
    async fn access_token(&self) -> AuthResult<String>;

    /// Drop any cached token so the next call fetches a fresh one.
    async fn invalidate(&self) {}
}

/// Fixed token, for emulators and tests.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> AuthResult<String> {
        Ok(self.0.clone())
    }
}
