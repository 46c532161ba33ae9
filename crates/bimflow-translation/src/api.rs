use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

use crate::error::TranslationError;

/// Token issued by the client-credentials grant.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// Raw remote operations, one HTTP exchange each (two for properties).
///
/// Implementations never retry and never return partial results for a
/// non-2xx answer.
#[async_trait]
pub trait TranslationApi: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken, TranslationError>;

    /// Create `bucket`; an existing bucket counts as success.
    async fn create_bucket(&self, token: &str, bucket: &str) -> Result<(), TranslationError>;

    /// Returns the remote object id.
    async fn upload_object(
        &self,
        token: &str,
        bucket: &str,
        name: &str,
        data: Bytes,
    ) -> Result<String, TranslationError>;

    /// Submit a translation of the object behind `urn`.
    async fn submit_job(&self, token: &str, urn: &str) -> Result<(), TranslationError>;

    async fn fetch_manifest(&self, token: &str, urn: &str) -> Result<Value, TranslationError>;

    async fn fetch_properties(&self, token: &str, urn: &str) -> Result<Value, TranslationError>;
}
