//! Drive v3 REST response types.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use dscan_models::ChangeEvent;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPageToken {
    pub start_page_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeList {
    #[serde(default)]
    pub changes: Vec<Change>,
    pub next_page_token: Option<String>,
    pub new_start_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub file_id: Option<String>,
    #[serde(default)]
    pub removed: bool,
    pub file: Option<DriveFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
    pub created_time: Option<String>,
    #[serde(default)]
    pub trashed: bool,
}

impl DriveFile {
    /// Convert to the scanner's event shape. Trashed files yield nothing.
    pub fn into_event(self) -> Option<ChangeEvent> {
        if self.trashed {
            return None;
        }

        let created_time = self.created_time.as_deref().and_then(|raw| {
            match DateTime::parse_from_rfc3339(raw) {
                Ok(t) => Some(t.with_timezone(&Utc)),
                Err(e) => {
                    debug!(file_id = %self.id, raw, "Unparsable createdTime: {}", e);
                    None
                }
            }
        });

        Some(ChangeEvent {
            id: self.id.into(),
            name: self.name,
            mime_type: self.mime_type,
            parents: self.parents,
            created_time,
        })
    }
}

impl Change {
    /// Event for a live file, `None` for removals.
    pub fn into_event(self) -> Option<ChangeEvent> {
        if self.removed {
            return None;
        }
        self.file.and_then(DriveFile::into_event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_conversion() {
        let list: ChangeList = serde_json::from_value(serde_json::json!({
            "changes": [
                {"fileId": "a", "removed": false, "file": {
                    "id": "a", "name": "a.mp4", "mimeType": "video/mp4",
                    "parents": ["f"], "createdTime": "2024-05-01T10:00:00.000Z"
                }},
                {"fileId": "b", "removed": true},
                {"fileId": "c", "file": {"id": "c", "mimeType": "video/mp4", "trashed": true}}
            ],
            "newStartPageToken": "99"
        }))
        .unwrap();

        let events: Vec<ChangeEvent> = list.changes.into_iter().filter_map(Change::into_event).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_str(), "a");
        assert!(events[0].created_time.is_some());
        assert_eq!(list.new_start_page_token.as_deref(), Some("99"));
    }

    #[test]
    fn test_bad_timestamp_is_none() {
        let file = DriveFile {
            id: "x".into(),
            name: "x.mov".into(),
            mime_type: "video/quicktime".into(),
            parents: vec![],
            created_time: Some("yesterday".into()),
            trashed: false,
        };
        assert!(file.into_event().unwrap().created_time.is_none());
    }
}
