//! Token caching on top of `gcp_auth`.
//!
//! Thread-safe, async-aware cache with:
//! - Refresh margin to avoid token expiry during requests
//! - Single-flight refresh so concurrent callers don't stampede the provider
//! - Fallback to the existing token while it is still usable

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{AccessTokenProvider, AuthError, AuthResult};

/// Refresh tokens 60 seconds before expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// TTL used when the provider reports no usable expiry.
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Load the service account named by `GOOGLE_APPLICATION_CREDENTIALS`, or fall
/// back to the ambient provider (metadata server on Cloud Run, gcloud locally).
pub async fn default_provider() -> AuthResult<Arc<dyn TokenProvider>> {
    let service_account = CustomServiceAccount::from_env()
        .map_err(|e| AuthError::Unavailable(format!("Failed to load service account: {}", e)))?;

    if let Some(sa) = service_account {
        info!("Using service account credentials from GOOGLE_APPLICATION_CREDENTIALS");
        return Ok(Arc::new(sa));
    }

    gcp_auth::provider()
        .await
        .map_err(|e| AuthError::Unavailable(format!("No Google credentials found: {}", e)))
}

/// Scoped token cache shared by one client.
pub struct TokenCache {
    auth: Arc<dyn TokenProvider>,
    scopes: Vec<&'static str>,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(auth: Arc<dyn TokenProvider>, scopes: &[&'static str]) -> Self {
        Self {
            auth,
            scopes: scopes.to_vec(),
            cache: RwLock::new(None),
        }
    }

    async fn get_token(&self) -> AuthResult<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited for the write lock.
        if let Some(cached) = cache.as_ref() {
            if cached.is_valid() {
                return Ok(cached.access_token.clone());
            }
        }

        self.refresh_token(&mut cache).await
    }

    async fn refresh_token(&self, cache: &mut Option<CachedToken>) -> AuthResult<String> {
        match self.auth.token(&self.scopes).await {
            Ok(token) => {
                let access_token = token.as_str().to_string();

                let now = Utc::now();
                let exp = token.expires_at();
                let expires_at = if exp > now {
                    match (exp - now).to_std() {
                        Ok(ttl) => Instant::now() + ttl,
                        Err(_) => Instant::now() + TOKEN_DEFAULT_TTL,
                    }
                } else {
                    // Already expired: force a refresh on the next request.
                    Instant::now()
                };

                *cache = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                });

                debug!(scopes = ?self.scopes, "Refreshed access token");
                Ok(access_token)
            }
            Err(e) => {
                if let Some(cached) = cache.as_ref() {
                    if cached.is_usable() {
                        warn!("Token refresh failed, using existing token: {}", e);
                        return Ok(cached.access_token.clone());
                    }
                }

                Err(AuthError::RefreshFailed(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl AccessTokenProvider for TokenCache {
    async fn access_token(&self) -> AuthResult<String> {
        self.get_token().await
    }

    async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }
}
