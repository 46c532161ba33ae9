//! Bimflow Storage Library
//!
//! The content store: a uniform put/get/delete/exists interface over the
//! local filesystem and S3-compatible object storage.
//!
//! # Storage key format
//!
//! Content is addressed by its SHA-256 digest and fanned out over two
//! directory levels: `content/{id[0..2]}/{id[2..4]}/{id}.{ext}`.
//!
//! Keys must not contain `..` or a leading `/`.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod retry;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use bimflow_core::StorageBackend;
pub use factory::create_storage;
pub use keys::content_key;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use retry::RetryingStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
