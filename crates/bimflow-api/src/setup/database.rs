//! Database setup and initialization

use anyhow::{Context, Result};
use bimflow_core::Config;
use bimflow_db::{
    ContentRepository, JobRepository, MemoryContentRepository, MemoryJobRepository,
    PgContentRepository, PgJobRepository,
};
use std::sync::Arc;

/// Content index and job store, whichever backend was selected.
#[derive(Clone)]
pub struct Repositories {
    pub contents: Arc<dyn ContentRepository>,
    pub jobs: Arc<dyn JobRepository>,
}

impl Repositories {
    /// Process-local repositories, used in degraded mode and in tests.
    pub fn in_memory() -> Self {
        Self {
            contents: Arc::new(MemoryContentRepository::new()),
            jobs: Arc::new(MemoryJobRepository::new()),
        }
    }
}

/// Connect to PostgreSQL and run migrations, or fall back to memory when
/// `DATABASE_URL` is not set.
pub async fn setup_database(config: &Config) -> Result<Repositories> {
    let Some(url) = config.database_url() else {
        tracing::warn!(
            "DATABASE_URL not set: content index and job queue are in-memory. \
             Deduplication only holds within this process and nothing survives a restart"
        );
        return Ok(Repositories::in_memory());
    };

    tracing::info!("Connecting to database...");
    let pool = bimflow_db::connect(url, config.db_max_connections())
        .await
        .context("Failed to connect to database")?;
    tracing::info!(
        max_connections = config.db_max_connections(),
        "Database connected successfully"
    );

    bimflow_db::run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Repositories {
        contents: Arc::new(PgContentRepository::new(pool.clone())),
        jobs: Arc::new(PgJobRepository::new(pool)),
    })
}
