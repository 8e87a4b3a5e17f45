//! Top-level reconciliation loop.
//!
//! `UNINITIALIZED` (no stored cursor) bootstraps the cursor and stops.
//! `STEADY` reads the cursor, fetches changes, dispatches them and stores
//! the next cursor only when every candidate was claimed and every batch
//! got a task. Anything less leaves the cursor where it was so the same
//! window is read again; the registry keeps already-claimed videos out.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dscan_models::{ChangeEvent, JobRecord, JobStatus, PayloadOverrides, PayloadParams, VideoId};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{DiscoveryStrategy, ScannerConfig, StrategyKind};
use crate::discovery::select_candidates;
use crate::dispatcher::{Candidate, DispatchReport, Dispatcher, FailedBatch};
use crate::error::{ScanError, ScanResult};
use crate::metrics::{record_scan, record_scan_failure};
use crate::ports::{ChangeSource, CursorStore, JobRegistry, TaskQueue};

/// Task-name window for full listings, which have no cursor.
const LISTING_WINDOW: &str = "full-listing";
const DIRECT_WINDOW: &str = "direct";

/// Which kind of pass produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Bootstrap,
    Discovery,
    Direct,
    Retry,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Bootstrap => "bootstrap",
            ScanPhase::Discovery => "discovery",
            ScanPhase::Direct => "direct",
            ScanPhase::Retry => "retry",
        }
    }
}

/// Response body of every scan-like operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// Nothing was left undone
    pub ok: bool,
    pub phase: ScanPhase,
    pub strategy: StrategyKind,
    /// Candidates after filtering
    pub discovered: usize,
    pub new_queued: usize,
    pub skipped: usize,
    pub lost: usize,
    pub batches: usize,
    pub queued_ids: Vec<VideoId>,
    /// Names of created tasks
    pub tasks: Vec<String>,
    pub duplicate_tasks: usize,
    pub failed_batches: Vec<FailedBatch>,
    pub cursor_advanced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ScanReport {
    fn empty(phase: ScanPhase, strategy: StrategyKind) -> Self {
        Self {
            ok: true,
            phase,
            strategy,
            discovered: 0,
            new_queued: 0,
            skipped: 0,
            lost: 0,
            batches: 0,
            queued_ids: Vec::new(),
            tasks: Vec::new(),
            duplicate_tasks: 0,
            failed_batches: Vec::new(),
            cursor_advanced: false,
            error: None,
            duration_ms: 0,
        }
    }

    fn from_dispatch(phase: ScanPhase, strategy: StrategyKind, dispatch: DispatchReport) -> Self {
        let ok = dispatch.is_complete();
        Self {
            ok,
            discovered: dispatch.candidates,
            new_queued: dispatch.newly_queued.len(),
            skipped: dispatch.skipped,
            lost: dispatch.lost,
            batches: dispatch.batches.len(),
            queued_ids: dispatch.newly_queued,
            duplicate_tasks: dispatch.task_handles.iter().filter(|h| h.duplicate).count(),
            tasks: dispatch.task_handles.into_iter().map(|h| h.name).collect(),
            failed_batches: dispatch.failed_batches,
            error: dispatch.claim_error,
            ..Self::empty(phase, strategy)
        }
    }
}

/// The discovery engine.
pub struct Reconciler {
    config: ScannerConfig,
    source: Arc<dyn ChangeSource>,
    cursor: Arc<dyn CursorStore>,
    dispatcher: Dispatcher,
    running: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        config: ScannerConfig,
        source: Arc<dyn ChangeSource>,
        cursor: Arc<dyn CursorStore>,
        registry: Arc<dyn JobRegistry>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        let dispatcher = Dispatcher::new(registry, queue, config.batch_size, config.dedup_task_names);
        Self {
            config,
            source,
            cursor,
            dispatcher,
            running: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn JobRegistry> {
        self.dispatcher.registry()
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        self.dispatcher.queue()
    }

    pub fn cursor_store(&self) -> &Arc<dyn CursorStore> {
        &self.cursor
    }

    /// One reconciliation pass. Refused while another pass is running.
    pub async fn run(&self, overrides: &PayloadOverrides) -> ScanResult<ScanReport> {
        let _running = self.running.try_lock().map_err(|_| ScanError::InProgress)?;
        let start = Instant::now();
        let params = overrides.apply(&self.config.payload);
        let span = info_span!("scan", strategy = ?self.config.strategy.kind());

        let result = match self.config.strategy {
            DiscoveryStrategy::ChangeFeed => self.run_change_feed(&params).instrument(span).await,
            DiscoveryStrategy::FullListing { .. } => self.run_listing(&params).instrument(span).await,
        };
        self.finish(result, start, "discovery")
    }

    /// Claim and enqueue explicit ids without discovery.
    ///
    /// An operator naming ids is an explicit action, so `ERROR` records are
    /// re-claimed; `QUEUED`, `PROCESSING` and `DONE` ones are still skipped.
    pub async fn dispatch_ids(&self, ids: Vec<VideoId>, params: &PayloadParams) -> ScanResult<ScanReport> {
        let start = Instant::now();
        let candidates = ids.into_iter().map(Candidate::from).collect();
        let result = self
            .dispatcher
            .dispatch(candidates, params, DIRECT_WINDOW, true)
            .await
            .map(|d| ScanReport::from_dispatch(ScanPhase::Direct, self.config.strategy.kind(), d));
        self.finish(result, start, "direct")
    }

    /// Explicit `ERROR -> QUEUED` retry of one video, followed by a single-video task.
    pub async fn retry(&self, video_id: &VideoId) -> ScanResult<ScanReport> {
        let start = Instant::now();
        let result = self.retry_inner(video_id).await;
        self.finish(result, start, "retry")
    }

    /// Apply a validated status transition reported for a job.
    ///
    /// `QUEUED` is refused: only `retry` takes that edge, because it is the
    /// path that also creates the task.
    pub async fn set_status(&self, video_id: &VideoId, status: JobStatus) -> ScanResult<JobRecord> {
        if status == JobStatus::Queued {
            return Err(ScanError::RequeueNeedsRetry(video_id.clone()));
        }
        if !self.registry().exists(video_id).await? {
            return Err(ScanError::NotFound(video_id.clone()));
        }
        self.registry().mark_status(video_id, status).await
    }

    async fn run_change_feed(&self, params: &PayloadParams) -> ScanResult<ScanReport> {
        let kind = self.config.strategy.kind();

        let Some(cursor) = self.cursor.load().await? else {
            let token = self.source.start_cursor().await?;
            self.cursor.save(&token).await?;
            info!("Bootstrapped change cursor, discovery starts next run");
            let mut report = ScanReport::empty(ScanPhase::Bootstrap, kind);
            report.cursor_advanced = true;
            return Ok(report);
        };

        let page = self.source.changes_since(&cursor).await?;
        let raw = page.events.len();
        let candidates = select_candidates(
            page.events,
            &self.config.strategy,
            self.config.folder_id.as_deref(),
            Utc::now(),
        );
        info!(raw, candidates = candidates.len(), "Fetched change window");

        let dispatch = self
            .dispatcher
            .dispatch(
                candidates.into_iter().map(Candidate::from).collect(),
                params,
                &cursor,
                self.config.requeue_errored,
            )
            .await?;
        let mut report = ScanReport::from_dispatch(ScanPhase::Discovery, kind, dispatch);

        if !report.ok {
            warn!(cursor = %cursor, "Dispatch incomplete, cursor not advanced");
            return Ok(report);
        }

        match self.cursor.save(&page.next_cursor).await {
            Ok(()) => report.cursor_advanced = page.next_cursor != cursor,
            Err(e) => {
                warn!("Tasks enqueued but cursor save failed: {}", e);
                report.ok = false;
                report.error = Some(format!("cursor not advanced: {}", e));
            }
        }
        Ok(report)
    }

    async fn run_listing(&self, params: &PayloadParams) -> ScanResult<ScanReport> {
        let folder_id = self
            .config
            .folder_id
            .as_deref()
            .ok_or_else(|| ScanError::config("full listing requires a folder id"))?;

        let events = self.source.list_folder(folder_id).await?;
        let raw = events.len();
        let candidates = select_candidates(events, &self.config.strategy, Some(folder_id), Utc::now());
        info!(raw, candidates = candidates.len(), folder_id, "Listed watched folder");

        let (unsettled, known) = self.skip_registered(candidates).await?;
        debug!(known, unsettled = unsettled.len(), "Filtered registered files");

        let mut dispatch = self
            .dispatcher
            .dispatch(
                unsettled.into_iter().map(Candidate::from).collect(),
                params,
                LISTING_WINDOW,
                self.config.requeue_errored,
            )
            .await?;
        dispatch.candidates += known;
        dispatch.skipped += known;
        Ok(ScanReport::from_dispatch(
            ScanPhase::Discovery,
            self.config.strategy.kind(),
            dispatch,
        ))
    }

    /// Drop listed files whose record already blocks dispatch.
    ///
    /// A full listing returns every file on every pass, so most are known.
    /// One read each is cheaper than the failed create plus read a claim
    /// costs on an existing record. The claim stays the source of truth for
    /// whatever passes this filter.
    async fn skip_registered(&self, events: Vec<ChangeEvent>) -> ScanResult<(Vec<ChangeEvent>, usize)> {
        let mut unsettled = Vec::with_capacity(events.len());
        let mut known = 0;
        for event in events {
            match self.registry().get(&event.id).await? {
                Some(record) if record.status.blocks_dispatch() || !self.config.requeue_errored => {
                    known += 1;
                }
                _ => unsettled.push(event),
            }
        }
        Ok((unsettled, known))
    }

    async fn retry_inner(&self, video_id: &VideoId) -> ScanResult<ScanReport> {
        let record = self
            .registry()
            .get(video_id)
            .await?
            .ok_or_else(|| ScanError::NotFound(video_id.clone()))?;
        if record.status != JobStatus::Error {
            return Err(ScanError::NotRetryable {
                video_id: video_id.clone(),
                status: record.status,
            });
        }

        self.registry().mark_status(video_id, JobStatus::Queued).await?;
        info!(video_id = %video_id, "Requeued errored job");

        let mut report = ScanReport::empty(ScanPhase::Retry, self.config.strategy.kind());
        report.discovered = 1;
        report.new_queued = 1;
        report.batches = 1;
        report.queued_ids = vec![video_id.clone()];

        let payload = self.config.payload.payload(vec![video_id.clone()]);
        match self.queue().enqueue(&payload, None).await {
            Ok(handle) => report.tasks.push(handle.name),
            Err(e) => {
                warn!(video_id = %video_id, "Retry enqueue failed, job left QUEUED: {}", e);
                report.ok = false;
                report.failed_batches.push(FailedBatch {
                    file_ids: vec![video_id.clone()],
                    error: e.to_string(),
                });
            }
        }
        Ok(report)
    }

    fn finish(
        &self,
        result: ScanResult<ScanReport>,
        start: Instant,
        phase: &'static str,
    ) -> ScanResult<ScanReport> {
        match result {
            Ok(mut report) => {
                report.duration_ms = start.elapsed().as_millis() as u64;
                record_scan(&report);
                Ok(report)
            }
            Err(e) => {
                warn!(phase, "Scan failed: {}", e);
                record_scan_failure(phase);
                Err(e)
            }
        }
    }
}
