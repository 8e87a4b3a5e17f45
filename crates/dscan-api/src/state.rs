//! Application state.

use std::sync::Arc;

use anyhow::Context;
use dscan_drive::DriveClient;
use dscan_firestore::{CursorRepository, FirestoreClient, JobRepository, ProbeRepository};
use dscan_scanner::{ProbeSink, Reconciler, ScannerConfig};
use dscan_tasks::TasksClient;
use tracing::info;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub reconciler: Arc<Reconciler>,
    pub probe: Arc<dyn ProbeSink>,
}

impl AppState {
    pub fn new(config: ApiConfig, reconciler: Arc<Reconciler>, probe: Arc<dyn ProbeSink>) -> Self {
        Self {
            config,
            reconciler,
            probe,
        }
    }

    /// Wire the engine to Drive, Firestore and Cloud Tasks from the environment.
    pub async fn from_env(config: ApiConfig) -> anyhow::Result<Self> {
        let scanner = ScannerConfig::from_env().context("scanner configuration")?;
        let firestore = FirestoreClient::from_env().await.context("Firestore client")?;
        let drive = DriveClient::from_env().await.context("Drive client")?;
        let tasks = TasksClient::from_env().await.context("Cloud Tasks client")?;

        info!(
            strategy = ?scanner.strategy,
            folder = scanner.folder_id.as_deref().unwrap_or("-"),
            batch_size = scanner.batch_size,
            queue = %tasks.config().queue_path(),
            "Scanner wired"
        );

        let cursor = CursorRepository::new(
            firestore.clone(),
            scanner.state_collection.clone(),
            scanner.source_id.clone(),
        );
        let jobs = JobRepository::new(firestore.clone(), scanner.jobs_collection.clone());
        let probe = ProbeRepository::new(firestore, scanner.state_collection.clone());

        let reconciler = Reconciler::new(
            scanner,
            Arc::new(drive),
            Arc::new(cursor),
            Arc::new(jobs),
            Arc::new(tasks),
        );

        Ok(Self::new(config, Arc::new(reconciler), Arc::new(probe)))
    }
}
