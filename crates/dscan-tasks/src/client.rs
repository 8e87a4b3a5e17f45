//! Cloud Tasks v2 REST client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD, Engine};
use dscan_auth::{AccessTokenProvider, TokenCache, CLOUD_PLATFORM_SCOPE};
use dscan_models::TaskPayload;
use metrics::{counter, histogram};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{TasksError, TasksResult};

/// Queue and callback target configuration.
#[derive(Debug, Clone)]
pub struct TasksConfig {
    pub project_id: String,
    pub region: String,
    pub queue_id: String,
    /// API origin, overridable for tests
    pub endpoint: String,
    /// Callback URL of the extraction worker
    pub worker_url: String,
    /// Service account the OIDC identity token is minted for
    pub service_account_email: String,
    /// OIDC audience; Cloud Tasks defaults it to the target URL when unset
    pub audience: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl TasksConfig {
    /// Create config from environment variables.
    ///
    /// `WORKER_URL` and `TASK_OIDC_SA` are required.
    pub fn from_env() -> TasksResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("GOOGLE_CLOUD_PROJECT"))
            .map_err(|_| TasksError::config("GCP_PROJECT_ID or GOOGLE_CLOUD_PROJECT must be set"))?;
        let worker_url = required("WORKER_URL")?;
        let service_account_email = required("TASK_OIDC_SA")?;

        Ok(Self {
            project_id,
            region: std::env::var("TASKS_REGION").unwrap_or_else(|_| "europe-west1".to_string()),
            queue_id: std::env::var("TASKS_QUEUE_ID").unwrap_or_else(|_| "video-jobs".to_string()),
            endpoint: std::env::var("TASKS_ENDPOINT")
                .unwrap_or_else(|_| "https://cloudtasks.googleapis.com".to_string()),
            worker_url,
            service_account_email,
            audience: std::env::var("TASK_OIDC_AUDIENCE").ok().filter(|s| !s.is_empty()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        })
    }

    /// `projects/{p}/locations/{r}/queues/{q}`
    pub fn queue_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/queues/{}",
            self.project_id, self.region, self.queue_id
        )
    }
}

fn required(key: &str) -> TasksResult<String> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| TasksError::config(format!("{} must be set", key)))
}

/// Handle of a created task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    /// Full resource name
    pub name: String,
    /// The named task already existed, so nothing new was enqueued.
    pub duplicate: bool,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    name: String,
}

/// Cloud Tasks client.
#[derive(Clone)]
pub struct TasksClient {
    http: Client,
    config: TasksConfig,
    tasks_url: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl TasksClient {
    pub fn new(config: TasksConfig, tokens: Arc<dyn AccessTokenProvider>) -> TasksResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("dscan-tasks/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let tasks_url = format!(
            "{}/v2/{}/tasks",
            config.endpoint.trim_end_matches('/'),
            config.queue_path()
        );

        Ok(Self {
            http,
            config,
            tasks_url,
            tokens,
        })
    }

    /// Create from environment variables and ambient Google credentials.
    pub async fn from_env() -> TasksResult<Self> {
        let config = TasksConfig::from_env()?;
        let auth = dscan_auth::default_provider().await?;
        Self::new(config, Arc::new(TokenCache::new(auth, &[CLOUD_PLATFORM_SCOPE])))
    }

    pub fn config(&self) -> &TasksConfig {
        &self.config
    }

    /// Enqueue a scan batch for the worker.
    ///
    /// With `task_id` set the task is named, and a conflict on that name is
    /// reported as a duplicate handle instead of an error.
    pub async fn enqueue(&self, payload: &TaskPayload, task_id: Option<&str>) -> TasksResult<TaskHandle> {
        let body = serde_json::to_vec(payload)?;
        let handle = self
            .enqueue_http(&self.config.worker_url, &body, task_id)
            .await?;
        info!(
            task = %handle.name,
            files = payload.file_ids.len(),
            duplicate = handle.duplicate,
            "Enqueued scan batch"
        );
        Ok(handle)
    }

    /// Enqueue a POST callback with a JSON body to an arbitrary target URL.
    pub async fn enqueue_http(&self, url: &str, body: &[u8], task_id: Option<&str>) -> TasksResult<TaskHandle> {
        let task_name = task_id.map(|id| format!("{}/tasks/{}", self.config.queue_path(), id));

        let mut oidc = json!({ "serviceAccountEmail": self.config.service_account_email });
        if let Some(audience) = &self.config.audience {
            oidc["audience"] = json!(audience);
        }
        let mut task = json!({
            "httpRequest": {
                "httpMethod": "POST",
                "url": url,
                "headers": { "Content-Type": "application/json" },
                "body": STANDARD.encode(body),
                "oidcToken": oidc,
            }
        });
        if let Some(name) = &task_name {
            task["name"] = json!(name);
        }
        let request = json!({ "task": task });

        let span = info_span!("tasks_request", operation = "create_task", queue = %self.config.queue_id);
        let start = Instant::now();

        let result = self
            .create_task(&request, task_name.as_deref())
            .instrument(span)
            .await;

        let status = match &result {
            Ok(handle) if handle.duplicate => 409,
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        counter!("tasks_requests_total", "operation" => "create_task", "status" => status.to_string())
            .increment(1);
        histogram!("tasks_latency_seconds", "operation" => "create_task")
            .record(start.elapsed().as_secs_f64());

        result
    }

    async fn create_task(&self, request: &serde_json::Value, task_name: Option<&str>) -> TasksResult<TaskHandle> {
        let response = self.send(request).await?;
        match (response.status(), task_name) {
            (StatusCode::OK, _) => {
                let created: CreatedTask = response.json().await?;
                Ok(TaskHandle {
                    name: created.name,
                    duplicate: false,
                })
            }
            (StatusCode::CONFLICT, Some(name)) => {
                warn!(task = %name, "Named task already exists");
                Ok(TaskHandle {
                    name: name.to_string(),
                    duplicate: true,
                })
            }
            (status, _) => {
                let body = response.text().await.unwrap_or_default();
                Err(TasksError::from_http_status(
                    status.as_u16(),
                    format!("create task in {} failed: {}", self.config.queue_path(), body),
                ))
            }
        }
    }

    async fn send(&self, request: &serde_json::Value) -> TasksResult<Response> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .post(&self.tasks_url)
            .bearer_auth(&token)
            .json(request)
            .send()
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("Cloud Tasks token rejected, refreshing once");
        self.tokens.invalidate().await;
        let token = self.tokens.access_token().await?;
        Ok(self
            .http
            .post(&self.tasks_url)
            .bearer_auth(&token)
            .json(request)
            .send()
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dscan_auth::StaticToken;
    use dscan_models::PayloadParams;
    use serial_test::serial;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TASKS: &str = "/v2/projects/p/locations/europe-west1/queues/video-jobs/tasks";

    fn test_client(server: &MockServer) -> TasksClient {
        let config = TasksConfig {
            project_id: "p".into(),
            region: "europe-west1".into(),
            queue_id: "video-jobs".into(),
            endpoint: server.uri(),
            worker_url: "https://worker.example/extract".into(),
            service_account_email: "scanner@p.iam.gserviceaccount.com".into(),
            audience: None,
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
        };
        TasksClient::new(config, Arc::new(StaticToken::new("tok"))).unwrap()
    }

    fn payload() -> TaskPayload {
        PayloadParams::default().payload(vec!["a".into(), "b".into()])
    }

    #[test]
    #[serial]
    fn test_config_requires_worker_url() {
        std::env::set_var("GCP_PROJECT_ID", "p");
        std::env::remove_var("WORKER_URL");
        std::env::set_var("TASK_OIDC_SA", "sa@p.iam.gserviceaccount.com");
        assert!(matches!(TasksConfig::from_env(), Err(TasksError::Config(_))));

        std::env::set_var("WORKER_URL", "https://worker.example/extract");
        let config = TasksConfig::from_env().unwrap();
        assert_eq!(config.queue_path(), "projects/p/locations/europe-west1/queues/video-jobs");

        std::env::remove_var("WORKER_URL");
        std::env::remove_var("TASK_OIDC_SA");
        std::env::remove_var("GCP_PROJECT_ID");
    }

    #[tokio::test]
    async fn test_enqueue_builds_oidc_http_task() {
        let server = MockServer::start().await;
        let expected_body = STANDARD.encode(serde_json::to_vec(&payload()).unwrap());
        Mock::given(method("POST"))
            .and(path(TASKS))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(json!({
                "task": {"httpRequest": {
                    "httpMethod": "POST",
                    "url": "https://worker.example/extract",
                    "body": expected_body,
                    "oidcToken": {"serviceAccountEmail": "scanner@p.iam.gserviceaccount.com"}
                }}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/p/locations/europe-west1/queues/video-jobs/tasks/123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let handle = test_client(&server).enqueue(&payload(), None).await.unwrap();
        assert_eq!(handle.name, "projects/p/locations/europe-west1/queues/video-jobs/tasks/123");
        assert!(!handle.duplicate);
    }

    #[tokio::test]
    async fn test_named_conflict_is_duplicate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TASKS))
            .and(body_partial_json(json!({
                "task": {"name": "projects/p/locations/europe-west1/queues/video-jobs/tasks/scan-1"}
            })))
            .respond_with(ResponseTemplate::new(409).set_body_string("ALREADY_EXISTS"))
            .mount(&server)
            .await;

        let handle = test_client(&server).enqueue(&payload(), Some("scan-1")).await.unwrap();
        assert!(handle.duplicate);
        assert!(handle.name.ends_with("/tasks/scan-1"));
    }

    #[tokio::test]
    async fn test_queue_errors_surface() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TASKS))
            .respond_with(ResponseTemplate::new(404).set_body_string("queue missing"))
            .mount(&server)
            .await;

        let err = test_client(&server).enqueue(&payload(), None).await.unwrap_err();
        assert!(matches!(err, TasksError::QueueNotFound(_)));
        assert_eq!(err.http_status(), Some(404));
    }
}
