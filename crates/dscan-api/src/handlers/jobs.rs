//! Job registry handlers.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use dscan_models::{JobRecord, JobStatus, VideoId};
use dscan_scanner::ScanReport;
use serde::Deserialize;
use tracing::info;

use super::json_body;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_VIDEO_ID_LEN: usize = 256;

fn parse_video_id(raw: &str) -> ApiResult<VideoId> {
    let valid = !raw.is_empty()
        && raw.len() <= MAX_VIDEO_ID_LEN
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(ApiError::bad_request(format!("Invalid video id: {}", raw)));
    }
    Ok(VideoId::from(raw))
}

/// `GET /jobs/:video_id`
pub async fn get_job(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    let video_id = parse_video_id(&video_id)?;
    let record = state
        .reconciler
        .registry()
        .get(&video_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No job for video {}", video_id)))?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

/// `POST /jobs/:video_id/status`: worker status report.
pub async fn update_status(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<JobRecord>> {
    let video_id = parse_video_id(&video_id)?;
    let update: StatusUpdate = json_body(&body)?;
    let status: JobStatus = update.status.parse().map_err(ApiError::bad_request)?;

    let record = state.reconciler.set_status(&video_id, status).await?;
    info!(video_id = %video_id, status = %record.status, "Job status updated");
    Ok(Json(record))
}

/// `POST /jobs/:video_id/retry`: re-enqueue an errored video.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<ScanReport>> {
    let video_id = parse_video_id(&video_id)?;
    let report = state.reconciler.retry(&video_id).await?;
    Ok(Json(report))
}
