//! Drive v3 REST client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dscan_auth::{AccessTokenProvider, TokenCache, DRIVE_READONLY_SCOPE};
use dscan_models::ChangeEvent;
use metrics::{counter, histogram};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, info_span, Instrument};

use crate::error::{DriveError, DriveResult};
use crate::types::{Change, ChangeList, DriveFile, FileList, StartPageToken};

const CHANGE_FIELDS: &str =
    "nextPageToken,newStartPageToken,changes(fileId,removed,file(id,name,mimeType,parents,createdTime,trashed))";
const FILE_FIELDS: &str = "nextPageToken,files(id,name,mimeType,parents,createdTime,trashed)";

/// Pages are drained until this many have been read; guards against a feed that never terminates.
const MAX_PAGES: usize = 10_000;

/// Drive client configuration.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// API origin, overridable for tests
    pub endpoint: String,
    /// Page size for `changes.list` and `files.list` (max 1000)
    pub page_size: u32,
    /// Shared drive to read changes from, if the folder lives in one
    pub drive_id: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://www.googleapis.com".to_string(),
            page_size: 1000,
            drive_id: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl DriveConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: std::env::var("DRIVE_ENDPOINT").unwrap_or(defaults.endpoint),
            page_size: std::env::var("DRIVE_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|n: u32| n.clamp(1, 1000))
                .unwrap_or(defaults.page_size),
            drive_id: std::env::var("DRIVE_SHARED_DRIVE_ID").ok().filter(|s| !s.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("DRIVE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            connect_timeout: defaults.connect_timeout,
        }
    }
}

/// Changes observed since a cursor, with the cursor to store afterwards.
#[derive(Debug, Clone)]
pub struct ChangePage {
    pub events: Vec<ChangeEvent>,
    pub next_cursor: String,
}

/// Google Drive v3 client.
#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    config: DriveConfig,
    base_url: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl DriveClient {
    pub fn new(config: DriveConfig, tokens: Arc<dyn AccessTokenProvider>) -> DriveResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("dscan-drive/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = format!("{}/drive/v3", config.endpoint.trim_end_matches('/'));

        Ok(Self {
            http,
            config,
            base_url,
            tokens,
        })
    }

    /// Create from environment variables and ambient Google credentials.
    pub async fn from_env() -> DriveResult<Self> {
        let auth = dscan_auth::default_provider().await?;
        Self::new(
            DriveConfig::from_env(),
            Arc::new(TokenCache::new(auth, &[DRIVE_READONLY_SCOPE])),
        )
    }

    /// Fresh cursor marking "now" in the change history.
    pub async fn start_page_token(&self) -> DriveResult<String> {
        let mut query = vec![("supportsAllDrives", "true".to_string())];
        if let Some(drive_id) = &self.config.drive_id {
            query.push(("driveId", drive_id.clone()));
        }

        let token: StartPageToken = self
            .get_json("start_page_token", "changes/startPageToken", &query)
            .await?;
        info!("Fetched change-feed start token");
        Ok(token.start_page_token)
    }

    /// All changes since `cursor`, draining every page.
    pub async fn list_changes(&self, cursor: &str) -> DriveResult<ChangePage> {
        let mut page_token = cursor.to_string();
        let mut events = Vec::new();
        let mut raw_changes = 0usize;

        for page in 0..MAX_PAGES {
            let mut query = vec![
                ("pageToken", page_token.clone()),
                ("pageSize", self.config.page_size.to_string()),
                ("fields", CHANGE_FIELDS.to_string()),
                ("includeRemoved", "false".to_string()),
                ("supportsAllDrives", "true".to_string()),
                ("includeItemsFromAllDrives", "true".to_string()),
            ];
            if let Some(drive_id) = &self.config.drive_id {
                query.push(("driveId", drive_id.clone()));
            }

            let list: ChangeList = self.get_json("list_changes", "changes", &query).await?;
            raw_changes += list.changes.len();
            events.extend(list.changes.into_iter().filter_map(Change::into_event));

            match (list.next_page_token, list.new_start_page_token) {
                (Some(next), _) => {
                    debug!(page, "Following change-feed page");
                    page_token = next;
                }
                (None, Some(new_start)) => {
                    info!(raw_changes, events = events.len(), pages = page + 1, "Drained change feed");
                    return Ok(ChangePage {
                        events,
                        next_cursor: new_start,
                    });
                }
                (None, None) => {
                    return Err(DriveError::invalid_response(
                        "change list carried neither nextPageToken nor newStartPageToken",
                    ))
                }
            }
        }

        Err(DriveError::invalid_response(format!(
            "change feed did not terminate within {} pages",
            MAX_PAGES
        )))
    }

    /// Every non-trashed video directly inside `folder_id`.
    pub async fn list_folder(&self, folder_id: &str) -> DriveResult<Vec<ChangeEvent>> {
        let q = format!(
            "'{}' in parents and trashed = false and mimeType contains 'video/'",
            folder_id.replace('\'', "\\'")
        );
        let mut page_token: Option<String> = None;
        let mut events = Vec::new();

        for _ in 0..MAX_PAGES {
            let mut query = vec![
                ("q", q.clone()),
                ("pageSize", self.config.page_size.to_string()),
                ("fields", FILE_FIELDS.to_string()),
                ("orderBy", "createdTime".to_string()),
                ("supportsAllDrives", "true".to_string()),
                ("includeItemsFromAllDrives", "true".to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let list: FileList = self.get_json("list_folder", "files", &query).await?;
            events.extend(list.files.into_iter().filter_map(DriveFile::into_event));

            match list.next_page_token {
                Some(next) => page_token = Some(next),
                None => {
                    info!(folder_id, files = events.len(), "Listed folder");
                    return Ok(events);
                }
            }
        }

        Err(DriveError::invalid_response(format!(
            "folder listing did not terminate within {} pages",
            MAX_PAGES
        )))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        resource: &str,
        query: &[(&str, String)],
    ) -> DriveResult<T> {
        let url = format!("{}/{}", self.base_url, resource);
        let span = info_span!("drive_request", operation);
        let start = Instant::now();

        let result = self.fetch::<T>(&url, query).instrument(span).await;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        counter!("drive_requests_total", "operation" => operation, "status" => status.to_string())
            .increment(1);
        histogram!("drive_latency_seconds", "operation" => operation)
            .record(start.elapsed().as_secs_f64());

        result
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> DriveResult<T> {
        let response = self.send(url, query).await?;
        match response.status() {
            StatusCode::OK => Ok(response.json::<T>().await?),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(DriveError::from_http_status(
                    status.as_u16(),
                    format!("{} failed: {}", url, body),
                ))
            }
        }
    }

    async fn send(&self, url: &str, query: &[(&str, String)]) -> DriveResult<Response> {
        let token = self.tokens.access_token().await?;
        let response = self.http.get(url).query(query).bearer_auth(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("Drive token rejected, refreshing once");
        self.tokens.invalidate().await;
        let token = self.tokens.access_token().await?;
        Ok(self.http.get(url).query(query).bearer_auth(&token).send().await?)
    }
}
