//! Task probe receipts.

use std::collections::HashMap;

use chrono::Utc;

use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::types::ToFirestoreValue;

const PROBE_DOC_ID: &str = "task_test";

/// Overwrites `{collection}/task_test` each time a probe task arrives.
#[derive(Clone)]
pub struct ProbeRepository {
    client: FirestoreClient,
    collection: String,
}

impl ProbeRepository {
    pub fn new(client: FirestoreClient, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    pub async fn record(&self, message: &str) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("ok".to_string(), true.to_firestore_value());
        fields.insert("message".to_string(), message.to_firestore_value());
        fields.insert("receivedAt".to_string(), Utc::now().to_firestore_value());

        // No mask: the whole document is replaced.
        self.client
            .update_document(&self.collection, PROBE_DOC_ID, fields, None)
            .await?;
        Ok(())
    }
}
