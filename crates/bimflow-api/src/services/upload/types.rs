use std::path::{Path, PathBuf};
use tempfile::TempPath;

use bimflow_core::Config;

/// Limits applied while staging.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_size_bytes: u64,
    /// Lowercase, without the leading dot.
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,
    /// Created on demand.
    pub temp_dir: PathBuf,
}

impl UploadPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_size_bytes: config.max_upload_size_bytes(),
            allowed_extensions: config.allowed_extensions().to_vec(),
            allowed_content_types: config.allowed_content_types().to_vec(),
            temp_dir: config.upload_temp_dir().clone(),
        }
    }
}

/// A fully received upload waiting for promotion.
///
/// The temporary file is removed when this value is dropped, so every exit
/// path (validation failure, duplicate, promotion error) cleans up.
#[derive(Debug)]
pub struct StagedFile {
    pub(super) temp_path: TempPath,
    pub original_name: String,
    pub declared_size: Option<u64>,
    /// Lowercase hex SHA-256 of the received bytes.
    pub content_id: String,
    pub size: u64,
    pub extension: String,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.temp_path
    }
}
