pub mod content;
pub mod job;
pub mod result;

pub use content::{content_type_for_extension, ContentRecord, NewContentRecord};
pub use job::{compute_retry_backoff, JobState, TranslationJob};
pub use result::ResultKind;
