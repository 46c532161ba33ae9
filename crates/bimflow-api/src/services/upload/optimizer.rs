use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, TryStreamExt};
use sha2::{Digest, Sha256};
use std::fmt::Display;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use bimflow_core::models::{content_type_for_extension, ContentRecord, NewContentRecord};
use bimflow_core::AppError;
use bimflow_db::ContentRepository;
use bimflow_storage::{content_key, Storage};

use super::locks::KeyedLocks;
use super::types::{StagedFile, UploadPolicy};
use crate::utils::upload::{
    sanitize_filename, validate_content_type, validate_file_extension, validate_file_size,
};

struct StageProgress {
    file: tokio::fs::File,
    hasher: Sha256,
    size: u64,
}

/// Stages uploads to disk while hashing them, then promotes them into the
/// content store under their digest.
pub struct UploadOptimizer {
    policy: UploadPolicy,
    storage: Arc<dyn Storage>,
    contents: Arc<dyn ContentRepository>,
    locks: KeyedLocks,
}

impl UploadOptimizer {
    pub fn new(
        policy: UploadPolicy,
        storage: Arc<dyn Storage>,
        contents: Arc<dyn ContentRepository>,
    ) -> Self {
        Self {
            policy,
            storage,
            contents,
            locks: KeyedLocks::default(),
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Validate and receive one file.
    ///
    /// Name, MIME hint and declared size are checked before a single byte is
    /// read. The running size is checked again on every chunk, so an
    /// oversized body is cut off at the ceiling instead of being read to the
    /// end.
    #[tracing::instrument(
        skip_all,
        fields(declared_name = %declared_name, declared_size = ?declared_size)
    )]
    pub async fn stage<S, E>(
        &self,
        stream: S,
        declared_name: &str,
        declared_size: Option<u64>,
        mime_hint: Option<&str>,
    ) -> Result<StagedFile, AppError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let original_name = sanitize_filename(declared_name)?;
        let extension = validate_file_extension(&original_name, &self.policy.allowed_extensions)?;
        if let Some(mime) = mime_hint {
            validate_content_type(mime, &self.policy.allowed_content_types)?;
        }
        if let Some(size) = declared_size {
            validate_file_size(size, self.policy.max_size_bytes)?;
        }

        tokio::fs::create_dir_all(&self.policy.temp_dir)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to create temp directory: {}", e)))?;
        let (file, temp_path) = self.create_temp_file()?.into_parts();

        let start = std::time::Instant::now();
        let max_size = self.policy.max_size_bytes;
        let initial = StageProgress {
            file: tokio::fs::File::from_std(file),
            hasher: Sha256::new(),
            size: 0,
        };

        // temp_path is dropped (and the file removed) on every early return below
        let StageProgress {
            mut file,
            hasher,
            size,
        } = stream
            .map_err(|e| AppError::InvalidInput(format!("Failed to read upload: {}", e)))
            .try_fold(initial, |mut progress, chunk| async move {
                progress.size += chunk.len() as u64;
                validate_file_size(progress.size, max_size)?;
                progress.hasher.update(&chunk);
                progress.file.write_all(&chunk).await?;
                Ok::<_, AppError>(progress)
            })
            .await?;

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if size == 0 {
            return Err(AppError::InvalidInput("Uploaded file is empty".to_string()));
        }

        let content_id = hex::encode(hasher.finalize());
        tracing::debug!(
            content_id = %content_id,
            size_bytes = size,
            duration_ms = start.elapsed().as_millis() as u64,
            temp_path = %temp_path.display(),
            "Upload staged"
        );

        Ok(StagedFile {
            temp_path,
            original_name,
            declared_size,
            content_id,
            size,
            extension,
        })
    }

    fn create_temp_file(&self) -> Result<NamedTempFile, AppError> {
        let prefix = format!(
            "upload_{}_{:08x}",
            Utc::now().timestamp_millis(),
            rand::random::<u32>()
        );
        tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".part")
            .rand_bytes(0)
            .tempfile_in(&self.policy.temp_dir)
            .map_err(|e| AppError::Storage(format!("Failed to create temp file: {}", e)))
    }

    /// Move a staged file into the content store and index it.
    ///
    /// Returns the record and whether the content was already known. Calls
    /// for the same digest are serialised; a duplicate never writes to the
    /// store.
    #[tracing::instrument(skip(self, staged), fields(content_id = %staged.content_id))]
    pub async fn promote(&self, staged: StagedFile) -> Result<(ContentRecord, bool), AppError> {
        let _guard = self.locks.lock(&staged.content_id).await;
        self.promote_locked(staged).await
    }

    async fn promote_locked(&self, staged: StagedFile) -> Result<(ContentRecord, bool), AppError> {
        if let Some(existing) = self.contents.get(&staged.content_id).await? {
            tracing::info!(
                content_id = %existing.content_id,
                original_name = %staged.original_name,
                "Duplicate upload, discarding staged bytes"
            );
            return Ok((existing, true));
        }

        let storage_key = content_key(&staged.content_id, &staged.extension);
        let stored_size = self.storage.put_file(&storage_key, staged.path()).await?;
        if stored_size != staged.size {
            tracing::warn!(
                storage_key = %storage_key,
                staged_size = staged.size,
                stored_size,
                "Stored size differs from staged size"
            );
        }

        let new_record = NewContentRecord {
            content_id: staged.content_id.clone(),
            original_name: staged.original_name.clone(),
            size: staged.size as i64,
            content_type: content_type_for_extension(&staged.extension).to_string(),
            storage_key,
        };
        let (record, inserted) = self.contents.insert_if_absent(new_record).await?;

        if inserted {
            tracing::info!(
                content_id = %record.content_id,
                storage_key = %record.storage_key,
                size_bytes = record.size,
                "Content promoted"
            );
        }
        Ok((record, !inserted))
    }
}
