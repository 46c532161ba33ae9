//! Storage abstraction trait
//!
//! This module defines the Storage trait that all content store backends implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bimflow_core::AppError;
use bytes::Bytes;
use std::path::Path;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Whether repeating the same call could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            StorageError::NotFound(_) | StorageError::InvalidKey(_) | StorageError::ConfigError(_)
        )
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Blob not found: {}", key)),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Content store abstraction
///
/// Callers depend only on this trait; the concrete backend is chosen once at
/// startup by [`crate::create_storage`]. Writes are atomic from a reader's
/// point of view: `get`/`exists` never observe a partially written blob.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `data` under `key`, creating intermediate namespaces, and return the size written.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<u64>;

    /// Store the file at `source` under `key` and return its size.
    ///
    /// Backends move the file when they can (atomic rename on the same
    /// filesystem) and stream it otherwise. `source` may no longer exist
    /// afterwards.
    async fn put_file(&self, key: &str, source: &Path) -> StorageResult<u64>;

    /// Read the blob stored under `key`.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Delete the blob under `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    fn backend_type(&self) -> StorageBackend;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimflow_core::ErrorMetadata;

    #[test]
    fn maps_to_app_errors() {
        let missing: AppError = StorageError::NotFound("content/ab/cd/x.ifc".into()).into();
        assert_eq!(missing.http_status_code(), 404);

        let traversal: AppError = StorageError::InvalidKey("../etc".into()).into();
        assert_eq!(traversal.http_status_code(), 400);

        let io: AppError = StorageError::UploadFailed("disk full".into()).into();
        assert_eq!(io.error_code(), "STORAGE_ERROR");
    }

    #[test]
    fn missing_and_invalid_keys_are_not_transient() {
        assert!(!StorageError::NotFound("k".into()).is_transient());
        assert!(!StorageError::InvalidKey("k".into()).is_transient());
        assert!(StorageError::BackendError("503".into()).is_transient());
    }
}
