//! File records reported by the storage provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::VideoId;

/// MIME prefix shared by all video types.
pub const VIDEO_MIME_PREFIX: &str = "video/";

/// One file observed during a discovery pass. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub id: VideoId,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
}

impl ChangeEvent {
    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with(VIDEO_MIME_PREFIX)
    }

    /// True if `folder_id` is one of the file's parents.
    pub fn in_folder(&self, folder_id: &str) -> bool {
        self.parents.iter().any(|p| p == folder_id)
    }

    /// Age relative to `now`, if the creation time is known.
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.created_time.map(|created| now - created)
    }
}

/// Oldest first. Unknown creation times sort last, ties break on id.
pub fn sort_by_creation(events: &mut [ChangeEvent]) {
    events.sort_by(|a, b| match (a.created_time, b.created_time) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    });
}
