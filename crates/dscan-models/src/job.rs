//! Job registry records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Storage-provider identifier of a video file.
///
/// Doubles as the job registry key, so there is at most one record per file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Processing status of a registry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Claimed by the scanner, task enqueued (or about to be)
    #[default]
    Queued,
    /// Picked up by the worker
    Processing,
    /// Extraction finished
    Done,
    /// Extraction failed
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Done => "DONE",
            JobStatus::Error => "ERROR",
        }
    }

    /// True if a record in this status must never be dispatched again by discovery.
    pub fn blocks_dispatch(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Processing | JobStatus::Done)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Re-asserting the current status is accepted. `Error -> Queued` is the
    /// explicit retry edge; discovery never takes it through this path.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        *self == next
            || matches!(
                (self, next),
                (Queued, Processing) | (Processing, Done) | (Processing, Error) | (Error, Queued)
            )
    }

    /// Validate a transition, returning a typed error when it is illegal.
    pub fn transition(self, next: JobStatus) -> Result<JobStatus, StatusTransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StatusTransitionError { from: self, to: next })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Ok(JobStatus::Queued),
            "PROCESSING" => Ok(JobStatus::Processing),
            "DONE" => Ok(JobStatus::Done),
            "ERROR" => Ok(JobStatus::Error),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal status transition {from} -> {to}")]
pub struct StatusTransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// One registry entry per video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub video_id: VideoId,
    pub name: String,
    pub status: JobStatus,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Fresh record in the `QUEUED` state.
    pub fn queued(video_id: impl Into<VideoId>, name: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            name: name.into(),
            status: JobStatus::Queued,
            updated_at: Utc::now(),
        }
    }
}

/// Result of an atomic registry claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller now owns the video; a task must follow.
    ///
    /// `supersedes` is the version of the errored record this claim
    /// replaced, `None` for a first claim. Each claim of a video therefore
    /// has its own identity.
    Claimed { supersedes: Option<String> },
    /// A record already exists in a status that blocks dispatch.
    Skipped(JobStatus),
    /// Another writer changed the record between read and conditional write.
    Lost,
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed { .. })
    }
}
