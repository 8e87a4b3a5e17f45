//! Claim, batch and enqueue.

use std::collections::HashMap;
use std::sync::Arc;

use dscan_models::{ChangeEvent, ClaimOutcome, PayloadParams, VideoId};
use dscan_tasks::{task_id_for, TaskHandle};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::ScanResult;
use crate::ports::{JobRegistry, TaskQueue};

/// A video offered for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: VideoId,
    pub name: String,
}

impl From<ChangeEvent> for Candidate {
    fn from(event: ChangeEvent) -> Self {
        Self {
            id: event.id,
            name: event.name,
        }
    }
}

impl From<VideoId> for Candidate {
    fn from(id: VideoId) -> Self {
        let name = id.to_string();
        Self { id, name }
    }
}

/// A batch whose task could not be created. Its videos stay `QUEUED`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedBatch {
    pub file_ids: Vec<VideoId>,
    pub error: String,
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Candidates offered to the registry
    pub candidates: usize,
    /// Claimed in this pass, in dispatch order
    pub newly_queued: Vec<VideoId>,
    pub skipped: usize,
    pub lost: usize,
    pub batches: Vec<Vec<VideoId>>,
    pub task_handles: Vec<TaskHandle>,
    pub failed_batches: Vec<FailedBatch>,
    /// Registry failure that stopped claiming part-way
    pub claim_error: Option<String>,
}

impl DispatchReport {
    /// Every candidate was decided and every batch has a task.
    pub fn is_complete(&self) -> bool {
        self.failed_batches.is_empty() && self.claim_error.is_none()
    }
}

/// Split `ids` into contiguous chunks of at most `size`, preserving order.
pub fn partition(ids: &[VideoId], size: usize) -> Vec<Vec<VideoId>> {
    ids.chunks(size.max(1)).map(<[VideoId]>::to_vec).collect()
}

/// Turns candidates into registry claims and tasks.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<dyn JobRegistry>,
    queue: Arc<dyn TaskQueue>,
    batch_size: usize,
    dedup_task_names: bool,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        queue: Arc<dyn TaskQueue>,
        batch_size: usize,
        dedup_task_names: bool,
    ) -> Self {
        Self {
            registry,
            queue,
            batch_size: batch_size.max(1),
            dedup_task_names,
        }
    }

    pub fn registry(&self) -> &Arc<dyn JobRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    /// Claim each candidate, then enqueue the claims in batches.
    ///
    /// Every claim happens before the first task is created. A registry
    /// error before anything was claimed fails the pass outright; a later
    /// one stops claiming but still enqueues what was already claimed.
    /// `window` and each claim's superseded version scope deterministic
    /// task names.
    pub async fn dispatch(
        &self,
        candidates: Vec<Candidate>,
        params: &PayloadParams,
        window: &str,
        requeue_errored: bool,
    ) -> ScanResult<DispatchReport> {
        let mut report = DispatchReport {
            candidates: candidates.len(),
            ..Default::default()
        };

        let mut superseded: HashMap<VideoId, String> = HashMap::new();

        for candidate in &candidates {
            match self
                .registry
                .try_claim(&candidate.id, &candidate.name, requeue_errored)
                .await
            {
                Ok(ClaimOutcome::Claimed { supersedes }) => {
                    if let Some(version) = supersedes {
                        superseded.insert(candidate.id.clone(), version);
                    }
                    report.newly_queued.push(candidate.id.clone());
                }
                Ok(ClaimOutcome::Skipped(status)) => {
                    debug!(video_id = %candidate.id, status = %status, "Already registered, skipping");
                    report.skipped += 1;
                }
                Ok(ClaimOutcome::Lost) => {
                    debug!(video_id = %candidate.id, "Claimed concurrently by another run");
                    report.lost += 1;
                }
                Err(e) if report.newly_queued.is_empty() => return Err(e),
                Err(e) => {
                    error!(video_id = %candidate.id, "Claim failed, dispatching {} already claimed: {}", report.newly_queued.len(), e);
                    report.claim_error = Some(e.to_string());
                    break;
                }
            }
        }

        report.batches = partition(&report.newly_queued, self.batch_size);

        for batch in &report.batches {
            let task_id = self.dedup_task_names.then(|| {
                let claims = batch
                    .iter()
                    .map(|id| (id, superseded.get(id).map(String::as_str)));
                task_id_for(claims, window)
            });
            let payload = params.payload(batch.clone());

            match self.queue.enqueue(&payload, task_id.as_deref()).await {
                Ok(handle) => report.task_handles.push(handle),
                Err(e) => {
                    warn!(files = batch.len(), "Batch enqueue failed, videos left QUEUED: {}", e);
                    report.failed_batches.push(FailedBatch {
                        file_ids: batch.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            candidates = report.candidates,
            queued = report.newly_queued.len(),
            skipped = report.skipped,
            lost = report.lost,
            batches = report.batches.len(),
            tasks = report.task_handles.len(),
            failed = report.failed_batches.len(),
            "Dispatch pass finished"
        );
        Ok(report)
    }
}
