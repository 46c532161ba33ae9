//! Service wiring: cache, breakers, translation client, worker pool and the
//! request-path services built on top of them.

use anyhow::Result;
use bimflow_core::Config;
use bimflow_infra::{Cache, InMemoryCache};
use bimflow_storage::Storage;
use bimflow_translation::{CacheTtls, CachingTranslationClient, TranslationApi, TranslationClient};
use bimflow_worker::{JobHandler, JobQueue, JobQueueConfig};
use std::sync::Arc;

use crate::services::ingestion::IngestionOrchestrator;
use crate::services::results::ResultService;
use crate::services::upload::{UploadOptimizer, UploadPolicy};
use crate::setup::database::Repositories;
use crate::state::AppState;
use crate::task_handlers::{TranslationHandlerConfig, TranslationTaskHandler};

/// Build the application state.
///
/// With `start_workers` false the queue only records jobs; some other
/// process has to run them.
pub fn initialize_services(
    config: &Config,
    storage: Arc<dyn Storage>,
    repositories: Repositories,
    api: Arc<dyn TranslationApi>,
    start_workers: bool,
) -> Result<Arc<AppState>> {
    let Repositories { contents, jobs } = repositories;

    let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new(config.cache_max_entries()));
    let translation = Arc::new(TranslationClient::from_config(api, config));
    let results = Arc::new(CachingTranslationClient::new(
        translation.clone(),
        cache.clone(),
        CacheTtls::from_config(config),
    ));

    let queue_config = JobQueueConfig::from_config(config);
    let queue = if start_workers {
        let handler: Arc<dyn JobHandler> = Arc::new(TranslationTaskHandler::new(
            storage.clone(),
            contents.clone(),
            translation.clone(),
            results.clone(),
            TranslationHandlerConfig::from_config(config),
        ));
        tracing::info!(
            max_workers = queue_config.max_workers,
            max_attempts = queue_config.max_attempts,
            "Translation worker pool started"
        );
        Arc::new(JobQueue::new(jobs.clone(), queue_config, handler))
    } else {
        Arc::new(JobQueue::new_no_worker(jobs.clone(), queue_config))
    };

    let optimizer = Arc::new(UploadOptimizer::new(
        UploadPolicy::from_config(config),
        storage.clone(),
        contents.clone(),
    ));
    let ingestion = Arc::new(IngestionOrchestrator::new(
        optimizer,
        queue.clone(),
        results.clone(),
    ));
    let result_service = Arc::new(ResultService::new(results, queue.clone()));

    Ok(Arc::new(AppState {
        config: config.clone(),
        storage,
        contents,
        jobs,
        queue,
        ingestion,
        results: result_service,
        translation,
        cache,
    }))
}
