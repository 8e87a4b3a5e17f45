//! Cloud Tasks reachability probe.
//!
//! `/task-test/enqueue` schedules a task that calls back into `/task-test`,
//! which records its arrival in the state collection.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const PROBE_MESSAGE: &str = "cloud task successfully reached /task-test";

#[derive(Serialize)]
pub struct ProbeResponse {
    pub ok: bool,
    pub message: &'static str,
    #[serde(rename = "taskName", skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
}

/// `POST /task-test`: target of the probe task.
pub async fn task_test(State(state): State<AppState>) -> ApiResult<Json<ProbeResponse>> {
    state.probe.record_probe(PROBE_MESSAGE).await?;
    info!("Probe task received");
    Ok(Json(ProbeResponse {
        ok: true,
        message: "task executed",
        task_name: None,
    }))
}

/// `POST /task-test/enqueue`: schedule a probe task against this service.
pub async fn enqueue_probe(State(state): State<AppState>) -> ApiResult<Json<ProbeResponse>> {
    let base_url = state
        .config
        .base_url
        .as_deref()
        .ok_or_else(|| ApiError::internal("SCANNER_BASE_URL is not configured"))?;

    let url = format!("{}/task-test", base_url);
    let handle = state.reconciler.queue().enqueue_callback(&url, b"{}").await?;
    info!(task = %handle.name, url = %url, "Probe task enqueued");

    Ok(Json(ProbeResponse {
        ok: true,
        message: "cloud task enqueued",
        task_name: Some(handle.name),
    }))
}
