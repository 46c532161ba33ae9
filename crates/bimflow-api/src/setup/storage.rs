//! Content store setup

use anyhow::{Context, Result};
use bimflow_core::Config;
use bimflow_storage::{create_storage, Storage};
use std::sync::Arc;

pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    let storage = create_storage(config)
        .await
        .context("Failed to initialize content store")?;

    tokio::fs::create_dir_all(config.upload_temp_dir())
        .await
        .with_context(|| {
            format!(
                "Failed to create upload temp dir {}",
                config.upload_temp_dir().display()
            )
        })?;

    Ok(storage)
}
