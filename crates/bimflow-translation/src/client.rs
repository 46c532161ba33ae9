use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use bimflow_core::Config;
use bimflow_infra::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};

use crate::api::{AccessToken, TranslationApi};
use crate::error::TranslationError;
use crate::quantities::{derive_quantities, QuantityTakeoff};

/// Tokens are refreshed this long before the remote says they expire.
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Identifies the derived results of one translated content item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivativeHandle {
    pub content_id: String,
    /// Base64url (unpadded) encoding of the remote object id.
    pub urn: String,
}

impl DerivativeHandle {
    pub fn new(content_id: impl Into<String>, urn: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            urn: urn.into(),
        }
    }
}

/// Read side of the translation service.
#[async_trait]
pub trait DerivativeSource: Send + Sync {
    async fn get_manifest(&self, handle: &DerivativeHandle) -> Result<Value, TranslationError>;

    async fn get_properties(&self, handle: &DerivativeHandle) -> Result<Value, TranslationError>;

    async fn get_quantities(
        &self,
        handle: &DerivativeHandle,
    ) -> Result<QuantityTakeoff, TranslationError>;
}

pub fn object_urn(object_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(object_id)
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

struct Breakers {
    authenticate: CircuitBreaker,
    ensure_bucket: CircuitBreaker,
    upload: CircuitBreaker,
    translate: CircuitBreaker,
    manifest: CircuitBreaker,
    properties: CircuitBreaker,
}

impl Breakers {
    fn new(template: &CircuitBreakerConfig) -> Self {
        let named = |name: &str| {
            CircuitBreaker::new(CircuitBreakerConfig {
                name: name.to_string(),
                ..template.clone()
            })
        };
        Self {
            authenticate: named("authenticate"),
            ensure_bucket: named("ensure-bucket"),
            upload: named("upload"),
            translate: named("translate"),
            manifest: named("manifest"),
            properties: named("properties"),
        }
    }

    fn all(&self) -> [&CircuitBreaker; 6] {
        [
            &self.authenticate,
            &self.ensure_bucket,
            &self.upload,
            &self.translate,
            &self.manifest,
            &self.properties,
        ]
    }
}

/// Breaker-protected translation client.
///
/// Each remote operation class has its own breaker, so an outage of the
/// properties endpoint does not block uploads. The access token is shared
/// and refreshed on expiry or after any authentication failure.
pub struct TranslationClient {
    api: Arc<dyn TranslationApi>,
    bucket: String,
    breakers: Breakers,
    token: Mutex<Option<CachedToken>>,
}

impl TranslationClient {
    pub fn new(
        api: Arc<dyn TranslationApi>,
        bucket: impl Into<String>,
        breaker_template: &CircuitBreakerConfig,
    ) -> Self {
        Self {
            api,
            bucket: bucket.into(),
            breakers: Breakers::new(breaker_template),
            token: Mutex::new(None),
        }
    }

    pub fn from_config(api: Arc<dyn TranslationApi>, config: &Config) -> Self {
        Self::new(
            api,
            config.forge_bucket(),
            &CircuitBreakerConfig::from_config("translation", config),
        )
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers.all().iter().map(|b| b.snapshot()).collect()
    }

    async fn guarded<T, F, Fut>(&self, breaker: &CircuitBreaker, op: F) -> Result<T, TranslationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TranslationError>>,
    {
        let result = breaker.call(op).await.map_err(TranslationError::from);
        if let Err(TranslationError::Auth(_)) = &result {
            self.token.lock().await.take();
        }
        result
    }

    /// Return a valid access token, fetching a new one when the cached one
    /// is missing or about to expire.
    pub async fn authenticate(&self) -> Result<String, TranslationError> {
        // Holding the lock across the fetch makes concurrent callers share one request
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let token = self.fetch_token().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_SKEW);
        tracing::debug!(expires_in = token.expires_in, "Translation service token acquired");

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    // Bypasses `guarded`: the caller already holds the token lock.
    async fn fetch_token(&self) -> Result<AccessToken, TranslationError> {
        self.breakers
            .authenticate
            .call(|| self.api.fetch_token())
            .await
            .map_err(TranslationError::from)
    }

    #[tracing::instrument(skip(self))]
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<(), TranslationError> {
        let token = self.authenticate().await?;
        self.guarded(&self.breakers.ensure_bucket, || {
            self.api.create_bucket(&token, bucket)
        })
        .await
    }

    /// Upload into the configured bucket; returns the remote object id.
    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn upload_blob(&self, data: Bytes, name: &str) -> Result<String, TranslationError> {
        let token = self.authenticate().await?;
        self.guarded(&self.breakers.upload, || {
            self.api.upload_object(&token, &self.bucket, name, data)
        })
        .await
    }

    /// Submit the translation and return the job handle (URN).
    #[tracing::instrument(skip(self))]
    pub async fn submit_translation(
        &self,
        object_id: &str,
        name: &str,
    ) -> Result<String, TranslationError> {
        let token = self.authenticate().await?;
        let urn = object_urn(object_id);
        self.guarded(&self.breakers.translate, || self.api.submit_job(&token, &urn))
            .await?;
        tracing::info!(urn = %urn, file_name = %name, "Translation submitted");
        Ok(urn)
    }

    pub async fn manifest(&self, urn: &str) -> Result<Value, TranslationError> {
        let token = self.authenticate().await?;
        self.guarded(&self.breakers.manifest, || {
            self.api.fetch_manifest(&token, urn)
        })
        .await
    }

    pub async fn properties(&self, urn: &str) -> Result<Value, TranslationError> {
        let token = self.authenticate().await?;
        self.guarded(&self.breakers.properties, || {
            self.api.fetch_properties(&token, urn)
        })
        .await
    }

    pub async fn quantities(&self, urn: &str) -> Result<QuantityTakeoff, TranslationError> {
        let properties = self.properties(urn).await?;
        Ok(derive_quantities(&properties))
    }
}

#[async_trait]
impl DerivativeSource for TranslationClient {
    async fn get_manifest(&self, handle: &DerivativeHandle) -> Result<Value, TranslationError> {
        self.manifest(&handle.urn).await
    }

    async fn get_properties(&self, handle: &DerivativeHandle) -> Result<Value, TranslationError> {
        self.properties(&handle.urn).await
    }

    async fn get_quantities(
        &self,
        handle: &DerivativeHandle,
    ) -> Result<QuantityTakeoff, TranslationError> {
        self.quantities(&handle.urn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimflow_infra::BreakerState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingApi {
        token_calls: AtomicUsize,
        manifest_calls: AtomicUsize,
        fail_manifest: bool,
    }

    #[async_trait]
    impl TranslationApi for CountingApi {
        async fn fetch_token(&self) -> Result<AccessToken, TranslationError> {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken {
                access_token: "tok".to_string(),
                expires_in: 3600,
            })
        }

        async fn create_bucket(&self, _: &str, _: &str) -> Result<(), TranslationError> {
            Ok(())
        }

        async fn upload_object(
            &self,
            _: &str,
            bucket: &str,
            name: &str,
            _: Bytes,
        ) -> Result<String, TranslationError> {
            Ok(format!("urn:adsk.objects:os.object:{}/{}", bucket, name))
        }

        async fn submit_job(&self, _: &str, _: &str) -> Result<(), TranslationError> {
            Ok(())
        }

        async fn fetch_manifest(&self, _: &str, _: &str) -> Result<Value, TranslationError> {
            self.manifest_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_manifest {
                return Err(TranslationError::remote(Some(500), "boom"));
            }
            Ok(serde_json::json!({"status": "success", "progress": "complete"}))
        }

        async fn fetch_properties(&self, _: &str, _: &str) -> Result<Value, TranslationError> {
            Ok(serde_json::json!({"data": {"collection": []}}))
        }
    }

    fn client(api: Arc<CountingApi>) -> TranslationClient {
        TranslationClient::new(api, "bimflow-dev", &CircuitBreakerConfig::new("translation"))
    }

    #[tokio::test(start_paused = true)]
    async fn token_is_reused_until_expiry_skew() {
        let api = Arc::new(CountingApi::default());
        let client = client(api.clone());

        client.authenticate().await.unwrap();
        client.authenticate().await.unwrap();
        assert_eq!(api.token_calls.load(Ordering::SeqCst), 1);

        // 3600s lifetime minus 60s skew
        tokio::time::advance(Duration::from_secs(3541)).await;
        client.authenticate().await.unwrap();
        assert_eq!(api.token_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn submit_returns_base64url_urn() {
        let client = client(Arc::new(CountingApi::default()));

        let object_id = client
            .upload_blob(Bytes::from_static(b"ISO-10303-21;"), "abc.ifc")
            .await
            .unwrap();
        let urn = client.submit_translation(&object_id, "tower.ifc").await.unwrap();

        assert_eq!(urn, object_urn("urn:adsk.objects:os.object:bimflow-dev/abc.ifc"));
        assert!(!urn.contains('=') && !urn.contains('+') && !urn.contains('/'));
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_rejects_without_remote_call() {
        let api = Arc::new(CountingApi {
            fail_manifest: true,
            ..Default::default()
        });
        let client = client(api.clone());

        for _ in 0..5 {
            assert!(client.manifest("dXJu").await.is_err());
        }
        assert_eq!(api.manifest_calls.load(Ordering::SeqCst), 5);

        let err = client.manifest("dXJu").await.unwrap_err();
        assert!(matches!(err, TranslationError::BreakerOpen { ref name } if name == "manifest"));
        assert_eq!(api.manifest_calls.load(Ordering::SeqCst), 5);

        let snapshots = client.breaker_snapshots();
        let manifest = snapshots.iter().find(|s| s.name == "manifest").unwrap();
        assert_eq!(manifest.state, BreakerState::Open);
        let upload = snapshots.iter().find(|s| s.name == "upload").unwrap();
        assert_eq!(upload.state, BreakerState::Closed);
    }
}
