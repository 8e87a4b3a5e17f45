//! Seam implementations over the REST clients.

use async_trait::async_trait;

use dscan_drive::{ChangePage, DriveClient};
use dscan_firestore::{CursorRepository, JobRepository, ProbeRepository};
use dscan_models::{ChangeEvent, ClaimOutcome, JobRecord, JobStatus, TaskPayload, VideoId};
use dscan_tasks::{TaskHandle, TasksClient};

use crate::error::ScanResult;
use crate::ports::{ChangeSource, CursorStore, JobRegistry, ProbeSink, TaskQueue};

#[async_trait]
impl ChangeSource for DriveClient {
    async fn start_cursor(&self) -> ScanResult<String> {
        Ok(self.start_page_token().await?)
    }

    async fn changes_since(&self, cursor: &str) -> ScanResult<ChangePage> {
        Ok(self.list_changes(cursor).await?)
    }

    async fn list_folder(&self, folder_id: &str) -> ScanResult<Vec<ChangeEvent>> {
        Ok(DriveClient::list_folder(self, folder_id).await?)
    }
}

#[async_trait]
impl CursorStore for CursorRepository {
    async fn load(&self) -> ScanResult<Option<String>> {
        Ok(CursorRepository::load(self).await?)
    }

    async fn save(&self, token: &str) -> ScanResult<()> {
        Ok(CursorRepository::save(self, token).await?)
    }
}

#[async_trait]
impl JobRegistry for JobRepository {
    async fn exists(&self, video_id: &VideoId) -> ScanResult<bool> {
        Ok(JobRepository::exists(self, video_id).await?)
    }

    async fn get(&self, video_id: &VideoId) -> ScanResult<Option<JobRecord>> {
        Ok(JobRepository::get(self, video_id).await?)
    }

    async fn mark_queued(&self, video_id: &VideoId, name: &str) -> ScanResult<()> {
        Ok(JobRepository::mark_queued(self, video_id, name).await?)
    }

    async fn mark_status(&self, video_id: &VideoId, status: JobStatus) -> ScanResult<JobRecord> {
        Ok(JobRepository::mark_status(self, video_id, status).await?)
    }

    async fn try_claim(
        &self,
        video_id: &VideoId,
        name: &str,
        requeue_errored: bool,
    ) -> ScanResult<ClaimOutcome> {
        Ok(JobRepository::try_claim(self, video_id, name, requeue_errored).await?)
    }
}

#[async_trait]
impl TaskQueue for TasksClient {
    async fn enqueue(&self, payload: &TaskPayload, task_id: Option<&str>) -> ScanResult<TaskHandle> {
        Ok(TasksClient::enqueue(self, payload, task_id).await?)
    }

    async fn enqueue_callback(&self, url: &str, body: &[u8]) -> ScanResult<TaskHandle> {
        Ok(self.enqueue_http(url, body, None).await?)
    }
}

#[async_trait]
impl ProbeSink for ProbeRepository {
    async fn record_probe(&self, message: &str) -> ScanResult<()> {
        Ok(self.record(message).await?)
    }
}
