use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at `base_path` (e.g., "./uploads"),
    /// creating the directory if needed.
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    /// Convert storage key to filesystem path, rejecting traversal outside the base directory
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        if storage_key.is_empty() || storage_key.contains("..") || storage_key.starts_with('/') {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }
        if Path::new(storage_key).is_absolute() {
            return Err(StorageError::InvalidKey(
                "Storage key resolves outside storage directory".to_string(),
            ));
        }
        Ok(self.base_path.join(storage_key))
    }

    /// Sibling path used to make writes atomic; renamed over the target once complete.
    fn staging_path_for(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4()))
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn commit(&self, staging: &Path, target: &Path) -> StorageResult<()> {
        if let Err(e) = fs::rename(staging, target).await {
            let _ = fs::remove_file(staging).await;
            return Err(StorageError::UploadFailed(format!(
                "Failed to rename into {}: {}",
                target.display(),
                e
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();
        let staging = Self::staging_path_for(&path);

        let write = async {
            let mut file = fs::File::create(&staging).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            Ok::<_, std::io::Error>(())
        };
        if let Err(e) = write.await {
            let _ = fs::remove_file(&staging).await;
            return Err(StorageError::UploadFailed(format!(
                "Failed to write file {}: {}",
                path.display(),
                e
            )));
        }
        self.commit(&staging, &path).await?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage put successful"
        );

        Ok(data.len() as u64)
    }

    async fn put_file(&self, key: &str, source: &Path) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();
        let size = fs::metadata(source).await?.len();

        // Same filesystem: a single atomic rename, no bytes copied
        if fs::rename(source, &path).await.is_ok() {
            tracing::info!(
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Local storage moved staged file"
            );
            return Ok(size);
        }

        // Crossing devices: copy next to the target, then rename
        let staging = Self::staging_path_for(&path);
        if let Err(e) = fs::copy(source, &staging).await {
            let _ = fs::remove_file(&staging).await;
            return Err(StorageError::UploadFailed(format!(
                "Failed to copy {} into store: {}",
                source.display(),
                e
            )));
        }
        self.commit(&staging, &path).await?;
        let _ = fs::remove_file(source).await;

        tracing::info!(
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage copied staged file across devices"
        );

        Ok(size)
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => {
                return Err(StorageError::DownloadFailed(format!(
                    "Failed to read file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        tracing::debug!(
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage get successful"
        );

        Ok(Bytes::from(data))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(key = %key, "Local storage delete successful");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
