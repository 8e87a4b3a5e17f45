//! Scanner configuration.

use std::time::Duration;

use dscan_models::PayloadParams;
use serde::Serialize;

use crate::error::{ScanError, ScanResult};

/// How candidates are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStrategy {
    /// Poll the change feed from the stored cursor.
    ChangeFeed,
    /// List the watched folder on every run; files younger than `min_age`
    /// are left for a later run.
    FullListing { min_age: Duration },
}

impl DiscoveryStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            DiscoveryStrategy::ChangeFeed => StrategyKind::ChangeFeed,
            DiscoveryStrategy::FullListing { .. } => StrategyKind::FullListing,
        }
    }
}

/// Strategy name as reported in scan responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    ChangeFeed,
    FullListing,
}

/// Scanner configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub strategy: DiscoveryStrategy,
    /// Watched folder. Required for full listing; filters the change feed when set.
    pub folder_id: Option<String>,
    /// Cursor document id inside `state_collection`
    pub source_id: String,
    pub jobs_collection: String,
    pub state_collection: String,
    /// Max file ids per task
    pub batch_size: usize,
    /// Let discovery re-claim `ERROR` records
    pub requeue_errored: bool,
    /// Derive task names from batch contents so Cloud Tasks rejects repeats
    pub dedup_task_names: bool,
    /// Payload defaults when a request carries no overrides
    pub payload: PayloadParams,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            strategy: DiscoveryStrategy::ChangeFeed,
            folder_id: None,
            source_id: "drive".to_string(),
            jobs_collection: "jobs".to_string(),
            state_collection: "state".to_string(),
            batch_size: 10,
            requeue_errored: false,
            dedup_task_names: false,
            payload: PayloadParams::default(),
        }
    }
}

impl ScannerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> ScanResult<Self> {
        let defaults = Self::default();
        let folder_id = std::env::var("FOLDER_ID").ok().filter(|s| !s.trim().is_empty());

        let strategy = match std::env::var("SCAN_MODE")
            .unwrap_or_else(|_| "change_feed".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "change_feed" | "changes" => DiscoveryStrategy::ChangeFeed,
            "full_listing" | "listing" => DiscoveryStrategy::FullListing {
                min_age: Duration::from_secs(env_parse("MIN_AGE_SECS", 0)),
            },
            other => return Err(ScanError::config(format!("unknown SCAN_MODE: {}", other))),
        };

        let source_id = std::env::var("SCAN_SOURCE_ID").unwrap_or_else(|_| match &folder_id {
            Some(folder) => format!("drive-{}", folder),
            None => defaults.source_id.clone(),
        });

        let config = Self {
            strategy,
            folder_id,
            source_id,
            jobs_collection: std::env::var("JOBS_COLLECTION").unwrap_or(defaults.jobs_collection),
            state_collection: std::env::var("STATE_COLLECTION").unwrap_or(defaults.state_collection),
            batch_size: env_parse("BATCH_SIZE", defaults.batch_size),
            requeue_errored: env_flag("SCAN_REQUEUE_ERRORED"),
            dedup_task_names: env_flag("TASK_DEDUP_NAMES"),
            payload: PayloadParams {
                concurrency: env_parse("TASK_CONCURRENCY", defaults.payload.concurrency),
                frames: env_parse("TASK_FRAMES", defaults.payload.frames),
                min_gap_sec: env_parse("TASK_MIN_GAP_SEC", defaults.payload.min_gap_sec),
                max_width: env_parse("TASK_MAX_WIDTH", defaults.payload.max_width),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ScanResult<()> {
        if self.batch_size == 0 {
            return Err(ScanError::config("BATCH_SIZE must be at least 1"));
        }
        if matches!(self.strategy, DiscoveryStrategy::FullListing { .. }) && self.folder_id.is_none() {
            return Err(ScanError::config("FOLDER_ID is required for full_listing"));
        }
        if self.source_id.trim().is_empty() || self.source_id.contains('/') {
            return Err(ScanError::config("SCAN_SOURCE_ID must be a non-empty document id"));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
