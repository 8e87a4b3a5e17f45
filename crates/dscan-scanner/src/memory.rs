//! In-memory collaborators.
//!
//! Deterministic stand-ins for Drive, Firestore and Cloud Tasks with
//! failure injection, used by the engine and HTTP tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};

use dscan_drive::{ChangePage, DriveError};
use dscan_firestore::FirestoreError;
use dscan_models::{ChangeEvent, ClaimOutcome, JobRecord, JobStatus, TaskPayload, VideoId};
use dscan_tasks::{TaskHandle, TasksError};

use crate::error::{ScanError, ScanResult};
use crate::ports::{ChangeSource, CursorStore, JobRegistry, ProbeSink, TaskQueue};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Change source
// =============================================================================

/// Change feed keyed by cursor, plus a fixed folder listing.
#[derive(Default)]
pub struct MemorySource {
    start: String,
    pages: Mutex<HashMap<String, ChangePage>>,
    listing: Mutex<Vec<ChangeEvent>>,
    failing: AtomicBool,
    feed_calls: AtomicUsize,
}

impl MemorySource {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            ..Default::default()
        }
    }

    /// Reading from `cursor` yields `events` and moves to `next`.
    pub fn push_page(&self, cursor: &str, events: Vec<ChangeEvent>, next: &str) {
        lock(&self.pages).insert(
            cursor.to_string(),
            ChangePage {
                events,
                next_cursor: next.to_string(),
            },
        );
    }

    pub fn set_listing(&self, events: Vec<ChangeEvent>) {
        *lock(&self.listing) = events;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Calls to `changes_since` so far.
    pub fn feed_calls(&self) -> usize {
        self.feed_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> ScanResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ScanError::Source(DriveError::ServerError(503, "injected".into())));
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeSource for MemorySource {
    async fn start_cursor(&self) -> ScanResult<String> {
        self.check()?;
        Ok(self.start.clone())
    }

    async fn changes_since(&self, cursor: &str) -> ScanResult<ChangePage> {
        self.feed_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        // Unknown cursors are quiet windows.
        Ok(lock(&self.pages).get(cursor).cloned().unwrap_or_else(|| ChangePage {
            events: Vec::new(),
            next_cursor: cursor.to_string(),
        }))
    }

    async fn list_folder(&self, folder_id: &str) -> ScanResult<Vec<ChangeEvent>> {
        self.check()?;
        Ok(lock(&self.listing)
            .iter()
            .filter(|e| e.in_folder(folder_id))
            .cloned()
            .collect())
    }
}

// =============================================================================
// Cursor
// =============================================================================

#[derive(Default)]
pub struct MemoryCursor {
    token: Mutex<Option<String>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryCursor {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
            ..Default::default()
        }
    }

    pub fn token(&self) -> Option<String> {
        lock(&self.token).clone()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CursorStore for MemoryCursor {
    async fn load(&self) -> ScanResult<Option<String>> {
        Ok(self.token())
    }

    async fn save(&self, token: &str) -> ScanResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ScanError::Registry(FirestoreError::ServerError(503, "injected".into())));
        }
        *lock(&self.token) = Some(token.to_string());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Job registry with the same claim semantics as the Firestore one.
#[derive(Default)]
pub struct MemoryRegistry {
    records: Mutex<HashMap<VideoId, JobRecord>>,
    writes: AtomicUsize,
    claim_calls: AtomicUsize,
    fail_claims_after: Mutex<Option<usize>>,
}

impl MemoryRegistry {
    /// Seed a record without counting it as a write.
    pub fn insert(&self, video_id: &str, status: JobStatus) {
        let mut record = JobRecord::queued(video_id, video_id);
        record.status = status;
        lock(&self.records).insert(video_id.into(), record);
    }

    pub fn status(&self, video_id: &VideoId) -> Option<JobStatus> {
        lock(&self.records).get(video_id).map(|r| r.status)
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn claim_calls(&self) -> usize {
        self.claim_calls.load(Ordering::SeqCst)
    }

    /// Let `n` more claims through, then fail every claim.
    pub fn fail_claims_after(&self, n: usize) {
        let seen = self.claim_calls.load(Ordering::SeqCst);
        *lock(&self.fail_claims_after) = Some(seen + n);
    }

    fn write(&self, record: JobRecord) {
        lock(&self.records).insert(record.video_id.clone(), record);
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobRegistry for MemoryRegistry {
    async fn exists(&self, video_id: &VideoId) -> ScanResult<bool> {
        Ok(lock(&self.records).contains_key(video_id))
    }

    async fn get(&self, video_id: &VideoId) -> ScanResult<Option<JobRecord>> {
        Ok(lock(&self.records).get(video_id).cloned())
    }

    async fn mark_queued(&self, video_id: &VideoId, name: &str) -> ScanResult<()> {
        self.write(JobRecord::queued(video_id.clone(), name));
        Ok(())
    }

    async fn mark_status(&self, video_id: &VideoId, status: JobStatus) -> ScanResult<JobRecord> {
        let Some(mut record) = lock(&self.records).get(video_id).cloned() else {
            return Err(FirestoreError::not_found(format!("jobs/{}", video_id)).into());
        };
        record.status = record
            .status
            .transition(status)
            .map_err(FirestoreError::from)?;
        record.updated_at = Utc::now();
        self.write(record.clone());
        Ok(record)
    }

    async fn try_claim(
        &self,
        video_id: &VideoId,
        name: &str,
        requeue_errored: bool,
    ) -> ScanResult<ClaimOutcome> {
        let call = self.claim_calls.fetch_add(1, Ordering::SeqCst);
        let limit = *lock(&self.fail_claims_after);
        if limit.is_some_and(|limit| call >= limit) {
            return Err(FirestoreError::ServerError(503, "injected".into()).into());
        }

        // Decide and write under one lock, like a conditional create.
        let mut records = lock(&self.records);
        let supersedes = match records.get(video_id) {
            Some(record) if record.status.blocks_dispatch() || !requeue_errored => {
                return Ok(ClaimOutcome::Skipped(record.status));
            }
            // Timestamp plus write count stands in for Firestore's updateTime.
            Some(record) => Some(format!(
                "{}#{}",
                record.updated_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
                self.writes.load(Ordering::SeqCst)
            )),
            None => None,
        };
        records.insert(video_id.clone(), JobRecord::queued(video_id.clone(), name));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(ClaimOutcome::Claimed { supersedes })
    }
}

// =============================================================================
// Task queue
// =============================================================================

/// Records enqueued payloads. Named tasks behave like Cloud Tasks: a repeat
/// name comes back as a duplicate handle.
#[derive(Default)]
pub struct RecordingQueue {
    sent: Mutex<Vec<(TaskPayload, Option<String>)>>,
    callbacks: Mutex<Vec<(String, Vec<u8>)>>,
    names: Mutex<HashSet<String>>,
    failing_calls: Mutex<HashSet<usize>>,
    calls: AtomicUsize,
}

impl RecordingQueue {
    /// Make the `n`-th `enqueue` call (zero-based) fail.
    pub fn fail_call(&self, n: usize) {
        lock(&self.failing_calls).insert(n);
    }

    pub fn payloads(&self) -> Vec<TaskPayload> {
        lock(&self.sent).iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn task_ids(&self) -> Vec<Option<String>> {
        lock(&self.sent).iter().map(|(_, id)| id.clone()).collect()
    }

    pub fn callbacks(&self) -> Vec<(String, Vec<u8>)> {
        lock(&self.callbacks).clone()
    }
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn enqueue(&self, payload: &TaskPayload, task_id: Option<&str>) -> ScanResult<TaskHandle> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if lock(&self.failing_calls).contains(&call) {
            return Err(TasksError::ServerError(503, "injected".into()).into());
        }

        let duplicate = task_id.is_some_and(|id| !lock(&self.names).insert(id.to_string()));
        let name = match task_id {
            Some(id) => format!("queues/test/tasks/{}", id),
            None => format!("queues/test/tasks/{}", call),
        };
        if !duplicate {
            lock(&self.sent).push((payload.clone(), task_id.map(str::to_string)));
        }
        Ok(TaskHandle { name, duplicate })
    }

    async fn enqueue_callback(&self, url: &str, body: &[u8]) -> ScanResult<TaskHandle> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.callbacks).push((url.to_string(), body.to_vec()));
        Ok(TaskHandle {
            name: format!("queues/test/tasks/{}", call),
            duplicate: false,
        })
    }
}

// =============================================================================
// Probe
// =============================================================================

#[derive(Default)]
pub struct MemoryProbe {
    messages: Mutex<Vec<String>>,
}

impl MemoryProbe {
    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}

#[async_trait]
impl ProbeSink for MemoryProbe {
    async fn record_probe(&self, message: &str) -> ScanResult<()> {
        lock(&self.messages).push(message.to_string());
        Ok(())
    }
}
