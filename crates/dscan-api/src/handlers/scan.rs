//! Scan triggers.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use dscan_models::{PayloadOverrides, ScanBatchRequest};
use dscan_scanner::ScanReport;
use tracing::info;
use validator::Validate;

use super::{json_body, json_or_default};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /scan`: one reconciliation pass.
///
/// The optional body carries payload overrides; an empty body uses the
/// configured defaults. Partial failures come back as `200` with `ok: false`.
pub async fn scan(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ScanReport>> {
    let overrides: PayloadOverrides = json_or_default(&body)?;
    overrides.validate()?;

    let report = state.reconciler.run(&overrides).await?;
    Ok(Json(report))
}

/// `POST /scan/batch`: claim and enqueue explicit file ids, no discovery.
pub async fn scan_batch(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ScanReport>> {
    let request: ScanBatchRequest = json_body(&body)?;
    request.validate()?;

    let ids = request.normalized_ids();
    if ids.is_empty() {
        return Err(ApiError::Validation(
            "fileIds must contain at least one non-blank id".to_string(),
        ));
    }

    info!(count = ids.len(), "Direct batch requested");
    let report = state.reconciler.dispatch_ids(ids, &request.params()).await?;
    Ok(Json(report))
}
