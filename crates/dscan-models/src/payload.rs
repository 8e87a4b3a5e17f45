//! Task payloads and the request bodies that shape them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::VideoId;

/// Body delivered to the extraction worker. Field names are a wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskPayload {
    #[serde(rename = "fileIds")]
    pub file_ids: Vec<VideoId>,
    pub concurrency: u32,
    pub frames: u32,
    pub min_gap_sec: f64,
    pub max_width: u32,
}

/// Extraction parameters attached to every batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PayloadParams {
    pub concurrency: u32,
    pub frames: u32,
    pub min_gap_sec: f64,
    pub max_width: u32,
}

impl Default for PayloadParams {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            frames: default_frames(),
            min_gap_sec: default_min_gap_sec(),
            max_width: default_max_width(),
        }
    }
}

impl PayloadParams {
    pub fn payload(&self, file_ids: Vec<VideoId>) -> TaskPayload {
        TaskPayload {
            file_ids,
            concurrency: self.concurrency,
            frames: self.frames,
            min_gap_sec: self.min_gap_sec,
            max_width: self.max_width,
        }
    }
}

fn default_concurrency() -> u32 {
    2
}

fn default_frames() -> u32 {
    20
}

fn default_min_gap_sec() -> f64 {
    2.0
}

fn default_max_width() -> u32 {
    640
}

/// Optional per-request overrides for `POST /scan`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct PayloadOverrides {
    #[validate(range(min = 1, max = 32))]
    pub concurrency: Option<u32>,
    #[validate(range(min = 1, max = 500))]
    pub frames: Option<u32>,
    #[validate(range(min = 0.0, max = 3600.0))]
    pub min_gap_sec: Option<f64>,
    #[validate(range(min = 16, max = 7680))]
    pub max_width: Option<u32>,
}

impl PayloadOverrides {
    pub fn is_empty(&self) -> bool {
        self.concurrency.is_none()
            && self.frames.is_none()
            && self.min_gap_sec.is_none()
            && self.max_width.is_none()
    }

    /// Layer these overrides on top of `base`.
    pub fn apply(&self, base: &PayloadParams) -> PayloadParams {
        PayloadParams {
            concurrency: self.concurrency.unwrap_or(base.concurrency),
            frames: self.frames.unwrap_or(base.frames),
            min_gap_sec: self.min_gap_sec.unwrap_or(base.min_gap_sec),
            max_width: self.max_width.unwrap_or(base.max_width),
        }
    }
}

/// Direct-batch request: enqueue the given files without discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ScanBatchRequest {
    #[serde(rename = "fileIds")]
    #[validate(length(min = 1, max = 1000))]
    pub file_ids: Vec<String>,
    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1, max = 32))]
    pub concurrency: u32,
    #[serde(default = "default_frames")]
    #[validate(range(min = 1, max = 500))]
    pub frames: u32,
    #[serde(default = "default_min_gap_sec")]
    #[validate(range(min = 0.0, max = 3600.0))]
    pub min_gap_sec: f64,
    #[serde(default = "default_max_width")]
    #[validate(range(min = 16, max = 7680))]
    pub max_width: u32,
}

impl ScanBatchRequest {
    pub fn params(&self) -> PayloadParams {
        PayloadParams {
            concurrency: self.concurrency,
            frames: self.frames,
            min_gap_sec: self.min_gap_sec,
            max_width: self.max_width,
        }
    }

    /// Trimmed, non-blank ids with duplicates removed, in request order.
    pub fn normalized_ids(&self) -> Vec<VideoId> {
        let mut seen = std::collections::HashSet::new();
        self.file_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .filter(|id| seen.insert(id.to_string()))
            .map(VideoId::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_wire_names() {
        let payload = PayloadParams::default().payload(vec!["a".into(), "b".into()]);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["fileIds"], serde_json::json!(["a", "b"]));
        assert_eq!(json["concurrency"], 2);
        assert_eq!(json["frames"], 20);
        assert_eq!(json["min_gap_sec"], 2.0);
        assert_eq!(json["max_width"], 640);
    }

    #[test]
    fn test_batch_request_defaults() {
        let req: ScanBatchRequest = serde_json::from_str(r#"{"fileIds": ["x"]}"#).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.params(), PayloadParams::default());
    }

    #[test]
    fn test_batch_request_rejects_empty_ids() {
        let req: ScanBatchRequest = serde_json::from_str(r#"{"fileIds": []}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_batch_request_rejects_out_of_range() {
        let req: ScanBatchRequest =
            serde_json::from_str(r#"{"fileIds": ["x"], "frames": 0}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_normalized_ids() {
        let req: ScanBatchRequest =
            serde_json::from_str(r#"{"fileIds": [" a ", "b", "", "a"]}"#).unwrap();
        let ids: Vec<String> = req.normalized_ids().into_iter().map(|v| v.0).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_overrides_apply() {
        let overrides = PayloadOverrides {
            frames: Some(40),
            ..Default::default()
        };
        assert!(!overrides.is_empty());
        let params = overrides.apply(&PayloadParams::default());
        assert_eq!(params.frames, 40);
        assert_eq!(params.concurrency, 2);
        assert!(PayloadOverrides::default().is_empty());
    }
}
