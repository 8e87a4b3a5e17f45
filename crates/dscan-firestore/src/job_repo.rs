//! Job registry: one document per video, keyed by the video id.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use dscan_models::{ClaimOutcome, JobRecord, JobStatus, VideoId};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_claim;
use crate::types::{Document, ToFirestoreValue, Value};

const FIELD_VIDEO_ID: &str = "videoId";
const FIELD_NAME: &str = "name";
const FIELD_STATUS: &str = "status";
const FIELD_UPDATED_AT: &str = "updatedAt";

/// Repository for job records.
#[derive(Clone)]
pub struct JobRepository {
    client: FirestoreClient,
    collection: String,
}

impl JobRepository {
    pub fn new(client: FirestoreClient, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    pub async fn exists(&self, video_id: &VideoId) -> FirestoreResult<bool> {
        Ok(self
            .client
            .get_document(&self.collection, video_id.as_str())
            .await?
            .is_some())
    }

    pub async fn get(&self, video_id: &VideoId) -> FirestoreResult<Option<JobRecord>> {
        match self.client.get_document(&self.collection, video_id.as_str()).await? {
            Some(doc) => Ok(Some(document_to_record(&doc, video_id)?)),
            None => Ok(None),
        }
    }

    /// Merge-upsert a `QUEUED` record. Unmasked fields are left alone.
    pub async fn mark_queued(&self, video_id: &VideoId, name: &str) -> FirestoreResult<()> {
        let fields = record_fields(video_id, name, JobStatus::Queued);
        self.client
            .update_document(
                &self.collection,
                video_id.as_str(),
                fields,
                Some(full_mask()),
            )
            .await?;
        debug!(video_id = %video_id, "Marked job queued");
        Ok(())
    }

    /// Apply a validated status transition.
    ///
    /// The write is conditioned on the `updateTime` that was read, so a
    /// concurrent writer turns this into [`FirestoreError::PreconditionFailed`]
    /// instead of a silent overwrite.
    pub async fn mark_status(&self, video_id: &VideoId, status: JobStatus) -> FirestoreResult<JobRecord> {
        let doc = self
            .client
            .get_document(&self.collection, video_id.as_str())
            .await?
            .ok_or_else(|| FirestoreError::not_found(format!("{}/{}", self.collection, video_id)))?;

        let mut record = document_to_record(&doc, video_id)?;
        record.status = record.status.transition(status)?;
        record.updated_at = Utc::now();

        let mut fields = HashMap::new();
        fields.insert(FIELD_STATUS.to_string(), status.as_str().to_firestore_value());
        fields.insert(FIELD_UPDATED_AT.to_string(), record.updated_at.to_firestore_value());
        let mask = Some(vec![FIELD_STATUS.to_string(), FIELD_UPDATED_AT.to_string()]);

        match doc.update_time.as_deref() {
            Some(update_time) => {
                self.client
                    .update_document_with_precondition(
                        &self.collection,
                        video_id.as_str(),
                        fields,
                        mask,
                        update_time,
                    )
                    .await?
            }
            None => {
                self.client
                    .update_document(&self.collection, video_id.as_str(), fields, mask)
                    .await?
            }
        };

        info!(video_id = %video_id, status = %status, "Updated job status");
        Ok(record)
    }

    /// Atomically claim a video for dispatch.
    ///
    /// Creates the record only if absent. An existing `ERROR` record is
    /// re-claimed when `requeue_errored` is set, guarded by the document's
    /// `updateTime` so only one concurrent caller can win.
    pub async fn try_claim(
        &self,
        video_id: &VideoId,
        name: &str,
        requeue_errored: bool,
    ) -> FirestoreResult<ClaimOutcome> {
        let fields = record_fields(video_id, name, JobStatus::Queued);

        let existing = match self
            .client
            .create_document(&self.collection, video_id.as_str(), fields.clone())
            .await
        {
            Ok(_) => {
                record_claim("claimed");
                return Ok(ClaimOutcome::Claimed { supersedes: None });
            }
            Err(FirestoreError::AlreadyExists(_)) => self
                .client
                .get_document(&self.collection, video_id.as_str())
                .await?,
            Err(e) => return Err(e),
        };

        let Some(doc) = existing else {
            // Deleted between our create and read; another run will see it fresh.
            record_claim("lost");
            return Ok(ClaimOutcome::Lost);
        };

        let record = document_to_record(&doc, video_id)?;
        if record.status.blocks_dispatch() || !requeue_errored {
            record_claim("skipped");
            return Ok(ClaimOutcome::Skipped(record.status));
        }

        let Some(update_time) = doc.update_time.as_deref() else {
            return Err(FirestoreError::invalid_response(format!(
                "{}/{} has no updateTime",
                self.collection, video_id
            )));
        };

        match self
            .client
            .update_document_with_precondition(
                &self.collection,
                video_id.as_str(),
                fields,
                Some(full_mask()),
                update_time,
            )
            .await
        {
            Ok(_) => {
                info!(video_id = %video_id, "Re-claimed errored job");
                record_claim("claimed");
                Ok(ClaimOutcome::Claimed {
                    supersedes: Some(update_time.to_string()),
                })
            }
            Err(e) if e.is_precondition_failed() => {
                warn!(video_id = %video_id, "Lost re-claim race");
                record_claim("lost");
                Ok(ClaimOutcome::Lost)
            }
            Err(e) => Err(e),
        }
    }
}

fn full_mask() -> Vec<String> {
    [FIELD_VIDEO_ID, FIELD_NAME, FIELD_STATUS, FIELD_UPDATED_AT]
        .iter()
        .map(|f| f.to_string())
        .collect()
}

fn record_fields(video_id: &VideoId, name: &str, status: JobStatus) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert(FIELD_VIDEO_ID.to_string(), video_id.as_str().to_firestore_value());
    fields.insert(FIELD_NAME.to_string(), name.to_firestore_value());
    fields.insert(FIELD_STATUS.to_string(), status.as_str().to_firestore_value());
    fields.insert(FIELD_UPDATED_AT.to_string(), Utc::now().to_firestore_value());
    fields
}

fn document_to_record(doc: &Document, video_id: &VideoId) -> FirestoreResult<JobRecord> {
    let status_str: String = doc.get(FIELD_STATUS).ok_or_else(|| {
        FirestoreError::invalid_response(format!("job {} has no status", video_id))
    })?;
    let status: JobStatus = status_str
        .parse()
        .map_err(|e: String| FirestoreError::invalid_response(format!("job {}: {}", video_id, e)))?;

    let updated_at = doc
        .get::<DateTime<Utc>>(FIELD_UPDATED_AT)
        .or_else(|| {
            doc.update_time
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc))
        })
        .unwrap_or_else(Utc::now);

    Ok(JobRecord {
        video_id: doc
            .get::<String>(FIELD_VIDEO_ID)
            .map(VideoId::from)
            .unwrap_or_else(|| video_id.clone()),
        name: doc.get(FIELD_NAME).unwrap_or_default(),
        status,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{test_client, DOCS};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const UPDATE_TIME: &str = "2024-05-01T10:00:00.123456Z";

    fn job_doc(status: &str) -> serde_json::Value {
        serde_json::json!({
            "name": "projects/test-project/databases/(default)/documents/jobs/vid-1",
            "fields": {
                "videoId": {"stringValue": "vid-1"},
                "name": {"stringValue": "clip.mp4"},
                "status": {"stringValue": status},
                "updatedAt": {"timestampValue": "2024-05-01T10:00:00Z"}
            },
            "updateTime": UPDATE_TIME
        })
    }

    async fn mount_conflict(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(format!("{}/jobs", DOCS)))
            .and(query_param("documentId", "vid-1"))
            .respond_with(ResponseTemplate::new(409).set_body_string("ALREADY_EXISTS"))
            .mount(server)
            .await;
    }

    async fn mount_existing(server: &MockServer, status: &str) {
        Mock::given(method("GET"))
            .and(path(format!("{}/jobs/vid-1", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(job_doc(status)))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_claim_creates_new_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}/jobs", DOCS)))
            .and(query_param("documentId", "vid-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(job_doc("QUEUED")))
            .expect(1)
            .mount(&server)
            .await;

        let repo = JobRepository::new(test_client(&server.uri()), "jobs");
        let outcome = repo.try_claim(&"vid-1".into(), "clip.mp4", false).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Claimed { supersedes: None });
    }

    #[tokio::test]
    async fn test_claim_skips_done_record() {
        let server = MockServer::start().await;
        mount_conflict(&server).await;
        mount_existing(&server, "DONE").await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let repo = JobRepository::new(test_client(&server.uri()), "jobs");
        let outcome = repo.try_claim(&"vid-1".into(), "clip.mp4", true).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Skipped(JobStatus::Done));
    }

    #[tokio::test]
    async fn test_claim_leaves_errored_record_without_opt_in() {
        let server = MockServer::start().await;
        mount_conflict(&server).await;
        mount_existing(&server, "ERROR").await;

        let repo = JobRepository::new(test_client(&server.uri()), "jobs");
        let outcome = repo.try_claim(&"vid-1".into(), "clip.mp4", false).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Skipped(JobStatus::Error));
    }

    #[tokio::test]
    async fn test_reclaim_errored_record_with_precondition() {
        let server = MockServer::start().await;
        mount_conflict(&server).await;
        mount_existing(&server, "ERROR").await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/jobs/vid-1", DOCS)))
            .and(query_param("currentDocument.updateTime", UPDATE_TIME))
            .respond_with(ResponseTemplate::new(200).set_body_json(job_doc("QUEUED")))
            .expect(1)
            .mount(&server)
            .await;

        let repo = JobRepository::new(test_client(&server.uri()), "jobs");
        let outcome = repo.try_claim(&"vid-1".into(), "clip.mp4", true).await.unwrap();
        assert_eq!(
            outcome,
            ClaimOutcome::Claimed {
                supersedes: Some(UPDATE_TIME.to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_reclaim_race_is_lost() {
        let server = MockServer::start().await;
        mount_conflict(&server).await;
        mount_existing(&server, "ERROR").await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"error":{"code":400,"status":"FAILED_PRECONDITION"}}"#,
            ))
            .mount(&server)
            .await;

        let repo = JobRepository::new(test_client(&server.uri()), "jobs");
        let outcome = repo.try_claim(&"vid-1".into(), "clip.mp4", true).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Lost);
    }

    #[tokio::test]
    async fn test_get_parses_record() {
        let server = MockServer::start().await;
        mount_existing(&server, "PROCESSING").await;

        let repo = JobRepository::new(test_client(&server.uri()), "jobs");
        let record = repo.get(&"vid-1".into()).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Processing);
        assert_eq!(record.name, "clip.mp4");
        assert!(repo.exists(&"vid-1".into()).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_status_rejects_backward_transition() {
        let server = MockServer::start().await;
        mount_existing(&server, "DONE").await;

        let repo = JobRepository::new(test_client(&server.uri()), "jobs");
        let err = repo
            .mark_status(&"vid-1".into(), JobStatus::Queued)
            .await
            .unwrap_err();
        assert!(matches!(err, FirestoreError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_mark_status_missing_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let repo = JobRepository::new(test_client(&server.uri()), "jobs");
        let err = repo
            .mark_status(&"vid-1".into(), JobStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, FirestoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_mark_queued_uses_field_mask() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/jobs/vid-1", DOCS)))
            .and(query_param("updateMask.fieldPaths", "status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(job_doc("QUEUED")))
            .expect(1)
            .mount(&server)
            .await;

        let repo = JobRepository::new(test_client(&server.uri()), "jobs");
        repo.mark_queued(&"vid-1".into(), "clip.mp4").await.unwrap();
    }
}
