//! Prometheus metrics for the HTTP surface.
//!
//! Scanner-level series (`dscan_scans_total` and friends) are recorded by the
//! engine itself and rendered through the same recorder.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "dscan_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "dscan_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "dscan_http_requests_in_flight";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Collapse video ids so the path label stays low-cardinality.
fn sanitize_path(path: &str) -> String {
    let mut out = Vec::new();
    let mut after_jobs = false;
    for segment in path.split('/') {
        if after_jobs && !segment.is_empty() {
            out.push(":video_id");
            after_jobs = false;
            continue;
        }
        after_jobs = segment == "jobs";
        out.push(segment);
    }
    out.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("/jobs/1AbC_x.mp4/retry"), "/jobs/:video_id/retry");
        assert_eq!(sanitize_path("/jobs/abc"), "/jobs/:video_id");
        assert_eq!(sanitize_path("/scan/batch"), "/scan/batch");
        assert_eq!(sanitize_path("/"), "/");
    }
}
