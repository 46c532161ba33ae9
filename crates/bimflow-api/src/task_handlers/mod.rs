//! Job handlers run by the background worker pool.

pub mod translation;

pub use translation::{TranslationHandlerConfig, TranslationTaskHandler};
