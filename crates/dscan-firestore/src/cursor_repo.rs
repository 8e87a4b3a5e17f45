//! Change-feed cursor persistence.

use std::collections::HashMap;

use chrono::Utc;
use tracing::debug;

use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::types::ToFirestoreValue;

const PAGE_TOKEN_FIELD: &str = "pageToken";
const UPDATED_AT_FIELD: &str = "updatedAt";

/// Singleton cursor document `{collection}/{source_id}` holding `{pageToken}`.
#[derive(Clone)]
pub struct CursorRepository {
    client: FirestoreClient,
    collection: String,
    source_id: String,
}

impl CursorRepository {
    pub fn new(
        client: FirestoreClient,
        collection: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            collection: collection.into(),
            source_id: source_id.into(),
        }
    }

    /// Stored token, or `None` before the first bootstrap.
    pub async fn load(&self) -> FirestoreResult<Option<String>> {
        let doc = self
            .client
            .get_document(&self.collection, &self.source_id)
            .await?;

        Ok(doc
            .and_then(|d| d.get::<String>(PAGE_TOKEN_FIELD))
            .filter(|token| !token.is_empty()))
    }

    /// Overwrite the stored token.
    pub async fn save(&self, token: &str) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert(PAGE_TOKEN_FIELD.to_string(), token.to_firestore_value());
        fields.insert(UPDATED_AT_FIELD.to_string(), Utc::now().to_firestore_value());

        self.client
            .update_document(
                &self.collection,
                &self.source_id,
                fields,
                Some(vec![PAGE_TOKEN_FIELD.to_string(), UPDATED_AT_FIELD.to_string()]),
            )
            .await?;

        debug!(source = %self.source_id, "Persisted change cursor");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{test_client, DOCS};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_load_absent_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/state/drive-folder", DOCS)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let repo = CursorRepository::new(test_client(&server.uri()), "state", "drive-folder");
        assert_eq!(repo.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_existing_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/state/drive-folder", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "projects/test-project/databases/(default)/documents/state/drive-folder",
                "fields": {"pageToken": {"stringValue": "1234"}}
            })))
            .mount(&server)
            .await;

        let repo = CursorRepository::new(test_client(&server.uri()), "state", "drive-folder");
        assert_eq!(repo.load().await.unwrap().as_deref(), Some("1234"));
    }

    #[tokio::test]
    async fn test_save_writes_page_token() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/state/drive-folder", DOCS)))
            .and(body_partial_json(serde_json::json!({
                "fields": {"pageToken": {"stringValue": "5678"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "fields": {"pageToken": {"stringValue": "5678"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let repo = CursorRepository::new(test_client(&server.uri()), "state", "drive-folder");
        repo.save("5678").await.unwrap();
    }
}
