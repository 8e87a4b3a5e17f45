//! Scan error types.

use dscan_drive::DriveError;
use dscan_firestore::FirestoreError;
use dscan_models::{JobStatus, VideoId};
use dscan_tasks::TasksError;
use thiserror::Error;

pub type ScanResult<T> = Result<T, ScanError>;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scan already in progress")]
    InProgress,

    #[error("Job not found: {0}")]
    NotFound(VideoId),

    #[error("Job {video_id} is {status}, only ERROR jobs can be retried")]
    NotRetryable { video_id: VideoId, status: JobStatus },

    #[error("Job {0} can only return to QUEUED through a retry")]
    RequeueNeedsRetry(VideoId),

    #[error("Change source error: {0}")]
    Source(#[from] DriveError),

    #[error("Registry error: {0}")]
    Registry(#[from] FirestoreError),

    #[error("Task queue error: {0}")]
    Queue(#[from] TasksError),
}

impl ScanError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Upstream HTTP status, when the failure came from a remote API.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Source(e) => e.http_status(),
            Self::Registry(e) => e.http_status(),
            Self::Queue(e) => e.http_status(),
            _ => None,
        }
    }
}
