//! Bounded retries for transient storage failures.
//!
//! Storage calls are retried here, at the call level, a fixed number of
//! times with exponential backoff. Once the budget is spent the error
//! surfaces to the caller unchanged.

use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Wraps a backend and retries transient errors.
pub struct RetryingStorage {
    inner: Arc<dyn Storage>,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryingStorage {
    pub fn new(inner: Arc<dyn Storage>, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    async fn run<T, F, Fut>(&self, op: &'static str, key: &str, mut call: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    tracing::warn!(
                        error = %e,
                        operation = op,
                        key = %key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Storage call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Storage for RetryingStorage {
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<u64> {
        self.run("put", key, move || self.inner.put(key, data.clone()))
            .await
    }

    async fn put_file(&self, key: &str, source: &Path) -> StorageResult<u64> {
        self.run("put_file", key, move || async move {
            if !tokio::fs::try_exists(source).await.unwrap_or(false) {
                // A previous attempt moved it before failing; nothing left to retry with
                return Err(StorageError::UploadFailed(format!(
                    "Staged file {} disappeared",
                    source.display()
                )));
            }
            self.inner.put_file(key, source).await
        })
        .await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.run("get", key, move || self.inner.get(key)).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.run("delete", key, move || self.inner.delete(key)).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.run("exists", key, move || self.inner.exists(key)).await
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls of `get`.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        not_found: bool,
    }

    #[async_trait]
    impl Storage for Flaky {
        async fn put(&self, _key: &str, data: Bytes) -> StorageResult<u64> {
            Ok(data.len() as u64)
        }

        async fn put_file(&self, _key: &str, _source: &Path) -> StorageResult<u64> {
            Ok(0)
        }

        async fn get(&self, key: &str) -> StorageResult<Bytes> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.not_found {
                return Err(StorageError::NotFound(key.to_string()));
            }
            if n < self.failures {
                return Err(StorageError::DownloadFailed("connection reset".to_string()));
            }
            Ok(Bytes::from_static(b"ok"))
        }

        async fn delete(&self, _key: &str) -> StorageResult<()> {
            Ok(())
        }

        async fn exists(&self, _key: &str) -> StorageResult<bool> {
            Ok(true)
        }

        fn backend_type(&self) -> StorageBackend {
            StorageBackend::Local
        }
    }

    fn flaky(failures: u32, not_found: bool) -> Arc<Flaky> {
        Arc::new(Flaky {
            failures,
            calls: AtomicU32::new(0),
            not_found,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let inner = flaky(2, false);
        let storage = RetryingStorage::new(inner.clone(), 3);

        let data = storage.get("k").await.unwrap();

        assert_eq!(&data[..], b"ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let inner = flaky(10, false);
        let storage = RetryingStorage::new(inner.clone(), 2);

        let result = storage.get("k").await;

        assert!(matches!(result, Err(StorageError::DownloadFailed(_))));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_not_retried() {
        let inner = flaky(0, true);
        let storage = RetryingStorage::new(inner.clone(), 3);

        let result = storage.get("k").await;

        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
