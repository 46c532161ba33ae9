//! Bimflow Core Library
//!
//! Domain models, error types and configuration shared by every bimflow
//! component: the upload path, the translation client, the job queue and the
//! HTTP API.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;
pub mod task_error;

// Re-export commonly used types
pub use config::{Config, PipelineConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use storage_types::StorageBackend;
pub use task_error::{TaskError, TaskResultExt};
// Note: Storage, StorageError, StorageResult live in bimflow-storage
