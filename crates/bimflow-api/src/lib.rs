//! Bimflow API Library
//!
//! HTTP surface of the ingestion pipeline: uploads, job status, content
//! records and translation results. Also hosts the upload optimizer, the
//! ingestion orchestrator and the translation job handler run by the
//! worker pool.

mod api_doc;
pub mod constants;
mod handlers;
pub mod identity;
pub mod services;
pub mod setup;
pub mod task_handlers;
mod utils;

pub mod error;
pub mod state;

pub use error::HttpAppError;
pub use identity::Caller;
pub use services::ingestion::{IngestOutcome, IngestionOrchestrator};
pub use services::results::ResultService;
pub use services::upload::{StagedFile, UploadOptimizer, UploadPolicy};
pub use state::AppState;
pub use task_handlers::{TranslationHandlerConfig, TranslationTaskHandler};
