//! Application setup and initialization
//!
//! Everything `main` needs to go from a [`Config`] to a serving router,
//! split so tests can assemble the same state around fakes.

pub mod database;
pub mod routes;
pub mod server;
pub mod services;
pub mod storage;

use crate::state::AppState;
use anyhow::{Context, Result};
use bimflow_core::Config;
use bimflow_infra::{init_telemetry, LogFormat};
use bimflow_translation::{ForgeApi, TranslationApi};
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    init_telemetry(LogFormat::from_env())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(environment = %config.environment(), "Configuration loaded and validated");

    let repositories = database::setup_database(&config).await?;
    let storage = storage::setup_storage(&config).await?;

    let api: Arc<dyn TranslationApi> = Arc::new(
        ForgeApi::from_config(&config).context("Failed to build translation API client")?,
    );

    let state = services::initialize_services(&config, storage, repositories, api, true)?;
    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}
