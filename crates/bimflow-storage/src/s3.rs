use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStore, ObjectStoreExt, PutPayload};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint for S3-compatible providers such as MinIO
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket.clone());

        if let Some(endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage { store, bucket })
    }

    fn location(key: &str) -> StorageResult<ObjectPath> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }
        ObjectPath::parse(key).map_err(|e| StorageError::InvalidKey(e.to_string()))
    }
}

fn map_get_error(key: &str, err: ObjectStoreError) -> StorageError {
    match err {
        ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
        other => StorageError::DownloadFailed(other.to_string()),
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<u64> {
        let location = Self::location(key)?;
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        // A single PUT is atomic: readers see the old object or the whole new one
        self.store
            .put(&location, PutPayload::from(data))
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 put failed"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 put successful"
        );

        Ok(size)
    }

    async fn put_file(&self, key: &str, source: &Path) -> StorageResult<u64> {
        let location = Self::location(key)?;
        let start = std::time::Instant::now();

        let mut file = tokio::fs::File::open(source).await?;
        let size = file.metadata().await?.len();

        // Multipart upload under the hood; the object only appears once completed
        let store: Arc<dyn ObjectStore> = Arc::new(self.store.clone());
        let mut writer = BufWriter::new(store, location);

        let copied = match tokio::io::copy(&mut file, &mut writer).await {
            Ok(n) => n,
            Err(e) => {
                let _ = writer.abort().await;
                return Err(StorageError::UploadFailed(format!(
                    "Failed to stream {} to S3: {}",
                    source.display(),
                    e
                )));
            }
        };
        writer
            .shutdown()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = copied,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 streamed upload successful"
        );

        Ok(size)
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let location = Self::location(key)?;
        let start = std::time::Instant::now();

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| map_get_error(key, e))?;
        let data = result
            .bytes()
            .await
            .map_err(|e| map_get_error(key, e))?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 get successful"
        );

        Ok(data)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let location = Self::location(key)?;
        match self.store.delete(&location).await {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {
                tracing::info!(bucket = %self.bucket, key = %key, "S3 delete successful");
                Ok(())
            }
            Err(e) => Err(StorageError::DeleteFailed(e.to_string())),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let location = Self::location(key)?;
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
