//! HTTP handlers.

pub mod health;
pub mod jobs;
pub mod probe;
pub mod scan;

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, ApiResult};

/// Decode a JSON body, treating an empty body as `T::default()`.
///
/// Decoding by hand keeps malformed bodies on the structured error path.
pub(crate) fn json_or_default<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    json_body(body)
}

pub(crate) fn json_body<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))
}
