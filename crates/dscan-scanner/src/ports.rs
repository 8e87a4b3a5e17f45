//! Collaborator seams of the engine.
//!
//! The reconciliation loop only talks to these traits. Production wiring
//! uses the REST clients (see `adapters`), tests use `memory`.

use async_trait::async_trait;

use dscan_drive::ChangePage;
use dscan_models::{ChangeEvent, ClaimOutcome, JobRecord, JobStatus, TaskPayload, VideoId};
use dscan_tasks::TaskHandle;

use crate::error::ScanResult;

/// Remote storage discovery.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Fresh cursor marking "now".
    async fn start_cursor(&self) -> ScanResult<String>;

    /// Every change after `cursor`, pagination fully drained.
    async fn changes_since(&self, cursor: &str) -> ScanResult<ChangePage>;

    /// Current video files of one folder.
    async fn list_folder(&self, folder_id: &str) -> ScanResult<Vec<ChangeEvent>>;
}

/// Singleton cursor per watched source.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load(&self) -> ScanResult<Option<String>>;
    async fn save(&self, token: &str) -> ScanResult<()>;
}

/// Per-video job ledger.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    async fn exists(&self, video_id: &VideoId) -> ScanResult<bool>;

    async fn get(&self, video_id: &VideoId) -> ScanResult<Option<JobRecord>>;

    /// Merge-upsert to `QUEUED`.
    async fn mark_queued(&self, video_id: &VideoId, name: &str) -> ScanResult<()>;

    /// Validated status transition of an existing record.
    async fn mark_status(&self, video_id: &VideoId, status: JobStatus) -> ScanResult<JobRecord>;

    /// Atomic create-if-absent claim.
    async fn try_claim(
        &self,
        video_id: &VideoId,
        name: &str,
        requeue_errored: bool,
    ) -> ScanResult<ClaimOutcome>;
}

/// Durable at-least-once task queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a worker batch, optionally under a fixed task id.
    async fn enqueue(&self, payload: &TaskPayload, task_id: Option<&str>) -> ScanResult<TaskHandle>;

    /// Enqueue a JSON POST callback to `url`.
    async fn enqueue_callback(&self, url: &str, body: &[u8]) -> ScanResult<TaskHandle>;
}

/// Record of probe tasks reaching the service.
#[async_trait]
pub trait ProbeSink: Send + Sync {
    async fn record_probe(&self, message: &str) -> ScanResult<()>;
}
