#[cfg(feature = "storage-local")]
use crate::LocalStorage;
use crate::RetryingStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use bimflow_core::Config;
use std::sync::Arc;

/// Create the content store selected by configuration, wrapped in bounded retries.
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    let backend: Arc<dyn Storage> = match config.storage_backend() {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket()
                .map(String::from)
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config.s3_region().to_string();
            let endpoint = config.s3_endpoint().map(String::from);

            Arc::new(S3Storage::new(bucket, region, endpoint).await?)
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => {
            return Err(StorageError::ConfigError(
                "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
            ))
        }

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => Arc::new(
            LocalStorage::new(config.local_storage_path().clone()).await?,
        ),

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => {
            return Err(StorageError::ConfigError(
                "Local storage backend not available (storage-local feature not enabled)"
                    .to_string(),
            ))
        }
    };

    tracing::info!(
        backend = %backend.backend_type(),
        max_retries = config.storage_max_retries(),
        "Content store initialized"
    );

    if config.storage_max_retries() == 0 {
        return Ok(backend);
    }
    Ok(Arc::new(RetryingStorage::new(
        backend,
        config.storage_max_retries(),
    )))
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use bimflow_core::PipelineConfig;
    use tempfile::tempdir;

    #[tokio::test]
    async fn builds_local_backend_from_config() {
        let dir = tempdir().unwrap();
        let config = Config::from(PipelineConfig {
            local_storage_path: dir.path().join("blobs"),
            ..Default::default()
        });

        let storage = create_storage(&config).await.unwrap();

        assert_eq!(storage.backend_type(), StorageBackend::Local);
        assert!(dir.path().join("blobs").is_dir());
    }
}
