//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::health::{health, ready, root};
use crate::handlers::jobs::{get_job, retry_job, update_status};
use crate::handlers::probe::{enqueue_probe, task_test};
use crate::handlers::scan::{scan, scan_batch};
use crate::metrics::metrics_middleware;
use crate::middleware::{request_id, request_logging};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let scan_routes = Router::new()
        .route("/", get(root))
        .route("/scan", post(scan))
        .route("/scan/batch", post(scan_batch));

    let job_routes = Router::new()
        .route("/jobs/:video_id", get(get_job))
        .route("/jobs/:video_id/status", post(update_status))
        .route("/jobs/:video_id/retry", post(retry_job));

    let probe_routes = Router::new()
        .route("/task-test", post(task_test))
        .route("/task-test/enqueue", post(enqueue_probe));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(scan_routes)
        .merge(job_routes)
        .merge(probe_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
