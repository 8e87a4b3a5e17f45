//! HTTP surface tests against the in-memory engine.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use dscan_api::{create_router, ApiConfig, AppState};
use dscan_models::{ChangeEvent, JobStatus, VideoId};
use dscan_scanner::memory::{MemoryCursor, MemoryProbe, MemoryRegistry, MemorySource, RecordingQueue};
use dscan_scanner::{Reconciler, ScannerConfig};

struct TestApp {
    source: Arc<MemorySource>,
    cursor: Arc<MemoryCursor>,
    registry: Arc<MemoryRegistry>,
    queue: Arc<RecordingQueue>,
    probe: Arc<MemoryProbe>,
    router: Router,
}

fn test_app(config: ApiConfig) -> TestApp {
    let source = Arc::new(MemorySource::new("start-1"));
    let cursor = Arc::new(MemoryCursor::default());
    let registry = Arc::new(MemoryRegistry::default());
    let queue = Arc::new(RecordingQueue::default());
    let probe = Arc::new(MemoryProbe::default());

    let scanner = ScannerConfig {
        batch_size: 2,
        ..Default::default()
    };
    let reconciler = Reconciler::new(
        scanner,
        source.clone(),
        cursor.clone(),
        registry.clone(),
        queue.clone(),
    );
    let state = AppState::new(config, Arc::new(reconciler), probe.clone());

    TestApp {
        source,
        cursor,
        registry,
        queue,
        probe,
        router: create_router(state, None),
    }
}

fn video(id: &str) -> ChangeEvent {
    ChangeEvent {
        id: id.into(),
        name: format!("{id}.mp4"),
        mime_type: "video/mp4".into(),
        parents: vec!["folder".into()],
        created_time: None,
    }
}

async fn call(router: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_root_and_health() {
    let app = test_app(ApiConfig::default());

    let (status, body) = call(&app.router, "GET", "/", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["service"], "drive-scanner");

    let (status, body) = call(&app.router, "GET", "/health", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = call(&app.router, "GET", "/ready", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_scan_bootstraps_then_discovers() {
    let app = test_app(ApiConfig::default());
    app.source
        .push_page("start-1", vec![video("a"), video("b"), video("c")], "c2");

    let (status, body) = call(&app.router, "POST", "/scan", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "bootstrap");
    assert_eq!(body["newQueued"], 0);
    assert_eq!(app.cursor.token().as_deref(), Some("start-1"));
    assert!(app.queue.payloads().is_empty());

    let (status, body) = call(&app.router, "POST", "/scan", "{}").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["phase"], "discovery");
    assert_eq!(body["newQueued"], 3);
    assert_eq!(body["batches"], 2);
    assert_eq!(body["cursorAdvanced"], true);
    assert_eq!(app.cursor.token().as_deref(), Some("c2"));
    assert_eq!(app.registry.status(&VideoId::from("b")), Some(JobStatus::Queued));
}

#[tokio::test]
async fn test_scan_applies_overrides() {
    let app = test_app(ApiConfig::default());
    call(&app.router, "POST", "/scan", "").await;
    app.source.push_page("start-1", vec![video("a")], "c2");

    let (status, _) = call(&app.router, "POST", "/scan", r#"{"frames": 50}"#).await;
    assert_eq!(status, StatusCode::OK);

    let payloads = app.queue.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].frames, 50);
    assert_eq!(payloads[0].concurrency, 2);
}

#[tokio::test]
async fn test_scan_rejects_bad_overrides() {
    let app = test_app(ApiConfig::default());

    let (status, body) = call(&app.router, "POST", "/scan", r#"{"frames": 0}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(body["code"], "validation_error");

    let (status, body) = call(&app.router, "POST", "/scan", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
    assert_eq!(app.source.feed_calls(), 0);
}

#[tokio::test]
async fn test_scan_batch() {
    let app = test_app(ApiConfig::default());
    app.registry.insert("done", JobStatus::Done);

    let (status, body) = call(
        &app.router,
        "POST",
        "/scan/batch",
        r#"{"fileIds": ["x", " y ", "x", "done"], "frames": 5}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "direct");
    assert_eq!(body["newQueued"], 2);
    assert_eq!(body["skipped"], 1);

    let payloads = app.queue.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].file_ids, vec![VideoId::from("x"), VideoId::from("y")]);
    assert_eq!(payloads[0].frames, 5);
    // Direct batches never touch the cursor
    assert_eq!(app.cursor.saves(), 0);
}

#[tokio::test]
async fn test_scan_batch_rejects_empty_ids() {
    let app = test_app(ApiConfig::default());

    let (status, _) = call(&app.router, "POST", "/scan/batch", r#"{"fileIds": []}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app.router, "POST", "/scan/batch", r#"{"fileIds": ["  "]}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app.router, "POST", "/scan/batch", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.queue.payloads().is_empty());
}

#[tokio::test]
async fn test_get_job() {
    let app = test_app(ApiConfig::default());

    let (status, body) = call(&app.router, "GET", "/jobs/missing", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    app.registry.insert("v1", JobStatus::Processing);
    let (status, body) = call(&app.router, "GET", "/jobs/v1", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["videoId"], "v1");
    assert_eq!(body["status"], "PROCESSING");
}

#[tokio::test]
async fn test_update_status() {
    let app = test_app(ApiConfig::default());
    app.registry.insert("v1", JobStatus::Queued);

    let (status, body) = call(&app.router, "POST", "/jobs/v1/status", r#"{"status": "processing"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PROCESSING");

    let (status, body) = call(&app.router, "POST", "/jobs/v1/status", r#"{"status": "QUEUED"}"#).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");
    assert_eq!(app.registry.status(&VideoId::from("v1")), Some(JobStatus::Processing));

    let (status, _) = call(&app.router, "POST", "/jobs/v1/status", r#"{"status": "PAUSED"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app.router, "POST", "/jobs/ghost/status", r#"{"status": "DONE"}"#).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_update_cannot_requeue() {
    let app = test_app(ApiConfig::default());
    app.registry.insert("failed", JobStatus::Error);

    let (status, body) = call(&app.router, "POST", "/jobs/failed/status", r#"{"status": "QUEUED"}"#).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");
    assert_eq!(app.registry.status(&VideoId::from("failed")), Some(JobStatus::Error));

    let (status, body) = call(&app.router, "POST", "/jobs/failed/retry", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(app.queue.payloads().len(), 1);
}

#[tokio::test]
async fn test_retry_job() {
    let app = test_app(ApiConfig::default());
    app.registry.insert("failed", JobStatus::Error);
    app.registry.insert("busy", JobStatus::Processing);

    let (status, body) = call(&app.router, "POST", "/jobs/failed/retry", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "retry");
    assert_eq!(body["newQueued"], 1);
    assert_eq!(app.registry.status(&VideoId::from("failed")), Some(JobStatus::Queued));
    assert_eq!(app.queue.payloads()[0].file_ids, vec![VideoId::from("failed")]);

    let (status, _) = call(&app.router, "POST", "/jobs/busy/retry", "").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&app.router, "POST", "/jobs/nobody/retry", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_task_test_records_probe() {
    let app = test_app(ApiConfig::default());

    let (status, body) = call(&app.router, "POST", "/task-test", "{}").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "task executed");
    assert_eq!(
        app.probe.messages(),
        vec!["cloud task successfully reached /task-test".to_string()]
    );
}

#[tokio::test]
async fn test_enqueue_probe() {
    let app = test_app(ApiConfig::default());
    let (status, body) = call(&app.router, "POST", "/task-test/enqueue", "").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["ok"], false);
    assert!(app.queue.callbacks().is_empty());

    let app = test_app(ApiConfig {
        base_url: Some("https://scanner.example.run.app".into()),
        ..Default::default()
    });
    let (status, body) = call(&app.router, "POST", "/task-test/enqueue", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "cloud task enqueued");
    assert!(body["taskName"].as_str().is_some());

    let callbacks = app.queue.callbacks();
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0].0, "https://scanner.example.run.app/task-test");
    assert_eq!(callbacks[0].1, b"{}".to_vec());
}

#[tokio::test]
async fn test_request_id_echoed() {
    let app = test_app(ApiConfig::default());
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("X-Request-ID", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["X-Request-ID"], "req-42");
}
