//! Shared data models for the drive scanner.
//!
//! This crate provides Serde-serializable types for:
//! - Job registry records and their status machine
//! - Change events reported by the storage provider
//! - Task payloads handed to the extraction worker
//! - Request bodies accepted by the HTTP surface

pub mod change;
pub mod job;
pub mod payload;

pub use change::{sort_by_creation, ChangeEvent, VIDEO_MIME_PREFIX};
pub use job::{ClaimOutcome, JobRecord, JobStatus, StatusTransitionError, VideoId};
pub use payload::{PayloadOverrides, PayloadParams, ScanBatchRequest, TaskPayload};
