//! Upload optimizer: validate, stream-hash and stage incoming design files,
//! then promote them into the content store.

mod locks;
mod optimizer;
mod types;

pub use optimizer::UploadOptimizer;
pub use types::{StagedFile, UploadPolicy};
