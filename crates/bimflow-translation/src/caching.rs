use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use bimflow_core::models::ResultKind;
use bimflow_core::Config;
use bimflow_infra::Cache;

use crate::client::{DerivativeHandle, DerivativeSource};
use crate::error::TranslationError;
use crate::quantities::{derive_quantities, QuantityTakeoff};

/// Manifest statuses after which the remote will not change its answer.
const TERMINAL_MANIFEST_STATUSES: [&str; 3] = ["success", "failed", "timeout"];

pub fn is_terminal_manifest(manifest: &Value) -> bool {
    manifest
        .get("status")
        .and_then(Value::as_str)
        .map(|status| TERMINAL_MANIFEST_STATUSES.contains(&status))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub manifest: Duration,
    pub properties: Duration,
    pub quantities: Duration,
}

impl CacheTtls {
    pub fn from_config(config: &Config) -> Self {
        Self {
            manifest: config.cache_ttl_manifest(),
            properties: config.cache_ttl_properties(),
            quantities: config.cache_ttl_quantities(),
        }
    }

    pub fn for_kind(&self, kind: ResultKind) -> Duration {
        match kind {
            ResultKind::Manifest => self.manifest,
            ResultKind::Properties => self.properties,
            ResultKind::Quantities => self.quantities,
        }
    }
}

/// A derived result and whether it came from the cache.
#[derive(Debug, Clone)]
pub struct CachedResult {
    pub value: Value,
    pub hit: bool,
}

/// Read-through cache in front of a [`DerivativeSource`].
///
/// Results are keyed `<kind>:<contentId>`. Cache failures never surface;
/// the worst case is an extra remote call.
pub struct CachingTranslationClient {
    inner: Arc<dyn DerivativeSource>,
    cache: Arc<dyn Cache>,
    ttls: CacheTtls,
}

impl CachingTranslationClient {
    pub fn new(inner: Arc<dyn DerivativeSource>, cache: Arc<dyn Cache>, ttls: CacheTtls) -> Self {
        Self { inner, cache, ttls }
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Cached value only; never calls the remote.
    pub async fn cached(&self, kind: ResultKind, content_id: &str) -> Option<Value> {
        self.cache.get(&kind.cache_key(content_id)).await
    }

    /// Serve `kind` from the cache, or fetch it and populate the cache.
    #[tracing::instrument(skip(self, handle), fields(content_id = %handle.content_id))]
    pub async fn fetch(
        &self,
        kind: ResultKind,
        handle: &DerivativeHandle,
    ) -> Result<CachedResult, TranslationError> {
        if let Some(value) = self.cached(kind, &handle.content_id).await {
            return Ok(CachedResult { value, hit: true });
        }

        let value = self.load(kind, handle).await?;
        if kind != ResultKind::Manifest || is_terminal_manifest(&value) {
            self.store(kind, &handle.content_id, value.clone()).await;
        }
        Ok(CachedResult { value, hit: false })
    }

    async fn load(
        &self,
        kind: ResultKind,
        handle: &DerivativeHandle,
    ) -> Result<Value, TranslationError> {
        match kind {
            ResultKind::Manifest => self.inner.get_manifest(handle).await,
            ResultKind::Properties => self.inner.get_properties(handle).await,
            // Derived locally, from cached properties when available
            ResultKind::Quantities => {
                let properties = match self.cached(ResultKind::Properties, &handle.content_id).await {
                    Some(properties) => properties,
                    None => {
                        let properties = self.inner.get_properties(handle).await?;
                        self.store(ResultKind::Properties, &handle.content_id, properties.clone())
                            .await;
                        properties
                    }
                };
                to_value(derive_quantities(&properties))
            }
        }
    }

    async fn store(&self, kind: ResultKind, content_id: &str, value: Value) {
        self.cache
            .set(&kind.cache_key(content_id), value, self.ttls.for_kind(kind))
            .await;
    }

    /// Write all three results of a finished translation at once.
    pub async fn store_results(
        &self,
        content_id: &str,
        manifest: Value,
        properties: Value,
        quantities: &QuantityTakeoff,
    ) -> Result<(), TranslationError> {
        let entries = vec![
            (
                ResultKind::Manifest.cache_key(content_id),
                manifest,
                self.ttls.manifest,
            ),
            (
                ResultKind::Properties.cache_key(content_id),
                properties,
                self.ttls.properties,
            ),
            (
                ResultKind::Quantities.cache_key(content_id),
                to_value(quantities)?,
                self.ttls.quantities,
            ),
        ];
        self.cache.set_many(entries).await;
        tracing::debug!(content_id = %content_id, "Translation results cached");
        Ok(())
    }

    /// Drop every cached result of a content item.
    pub async fn invalidate(&self, content_id: &str) -> usize {
        self.cache
            .invalidate_pattern(&ResultKind::content_pattern(content_id))
            .await
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, TranslationError> {
    serde_json::to_value(value)
        .map_err(|e| TranslationError::remote(None, format!("Failed to encode result: {}", e)))
}

#[async_trait]
impl DerivativeSource for CachingTranslationClient {
    async fn get_manifest(&self, handle: &DerivativeHandle) -> Result<Value, TranslationError> {
        Ok(self.fetch(ResultKind::Manifest, handle).await?.value)
    }

    async fn get_properties(&self, handle: &DerivativeHandle) -> Result<Value, TranslationError> {
        Ok(self.fetch(ResultKind::Properties, handle).await?.value)
    }

    async fn get_quantities(
        &self,
        handle: &DerivativeHandle,
    ) -> Result<QuantityTakeoff, TranslationError> {
        let value = self.fetch(ResultKind::Quantities, handle).await?.value;
        serde_json::from_value(value).map_err(|e| {
            TranslationError::remote(None, format!("Cached quantities are malformed: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimflow_infra::InMemoryCache;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        manifest_status: &'static str,
        manifest_calls: AtomicUsize,
        properties_calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(manifest_status: &'static str) -> Arc<Self> {
            Arc::new(Self {
                manifest_status,
                manifest_calls: AtomicUsize::new(0),
                properties_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DerivativeSource for FakeSource {
        async fn get_manifest(&self, _: &DerivativeHandle) -> Result<Value, TranslationError> {
            self.manifest_calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "status": self.manifest_status }))
        }

        async fn get_properties(&self, _: &DerivativeHandle) -> Result<Value, TranslationError> {
            self.properties_calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"data": {"collection": [
                {"name": "Slab [1]", "properties": {"Dimensions": {"Area": "40 m^2"}}}
            ]}}))
        }

        async fn get_quantities(
            &self,
            _: &DerivativeHandle,
        ) -> Result<QuantityTakeoff, TranslationError> {
            unreachable!("quantities are derived by the caching client")
        }
    }

    fn caching(source: Arc<FakeSource>) -> CachingTranslationClient {
        let ttl = Duration::from_secs(60);
        CachingTranslationClient::new(
            source,
            Arc::new(InMemoryCache::new(100)),
            CacheTtls {
                manifest: ttl,
                properties: ttl,
                quantities: ttl,
            },
        )
    }

    fn handle() -> DerivativeHandle {
        DerivativeHandle::new("abc", "dXJu")
    }

    #[tokio::test]
    async fn terminal_manifest_is_served_from_cache() {
        let source = FakeSource::new("success");
        let client = caching(source.clone());

        let first = client.fetch(ResultKind::Manifest, &handle()).await.unwrap();
        let second = client.fetch(ResultKind::Manifest, &handle()).await.unwrap();

        assert!(!first.hit);
        assert!(second.hit);
        assert_eq!(source.manifest_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn in_progress_manifest_is_not_cached() {
        let source = FakeSource::new("inprogress");
        let client = caching(source.clone());

        client.get_manifest(&handle()).await.unwrap();
        client.get_manifest(&handle()).await.unwrap();

        assert_eq!(source.manifest_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn quantities_reuse_cached_properties() {
        let source = FakeSource::new("success");
        let client = caching(source.clone());

        client.get_properties(&handle()).await.unwrap();
        let takeoff = client.get_quantities(&handle()).await.unwrap();

        assert_eq!(takeoff.areas[0].quantity, 40.0);
        assert_eq!(source.properties_calls.load(Ordering::SeqCst), 1);
        assert!(client.cached(ResultKind::Quantities, "abc").await.is_some());
    }

    #[tokio::test]
    async fn stored_results_can_be_invalidated() {
        let client = caching(FakeSource::new("success"));
        client
            .store_results(
                "abc",
                json!({"status": "success"}),
                json!({}),
                &QuantityTakeoff::default(),
            )
            .await
            .unwrap();

        for kind in ResultKind::ALL {
            assert!(client.cached(kind, "abc").await.is_some());
        }
        assert_eq!(client.invalidate("abc").await, 3);
        assert!(client.cached(ResultKind::Manifest, "abc").await.is_none());
    }
}
