use std::sync::Arc;

use bimflow_core::Config;
use bimflow_db::{ContentRepository, JobRepository};
use bimflow_infra::Cache;
use bimflow_storage::Storage;
use bimflow_translation::TranslationClient;
use bimflow_worker::JobQueue;

use crate::services::ingestion::IngestionOrchestrator;
use crate::services::results::ResultService;

/// Shared application state handed to every handler.
///
/// Everything is injected at startup; nothing here is a process global, so
/// tests can build as many independent instances as they like.
pub struct AppState {
    pub config: Config,
    pub storage: Arc<dyn Storage>,
    pub contents: Arc<dyn ContentRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub queue: Arc<JobQueue>,
    pub ingestion: Arc<IngestionOrchestrator>,
    pub results: Arc<ResultService>,
    pub translation: Arc<TranslationClient>,
    pub cache: Arc<dyn Cache>,
}

impl AppState {
    /// Stop the worker pool; in-flight jobs get the configured grace period.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
        tracing::info!("Application state shut down");
    }
}
