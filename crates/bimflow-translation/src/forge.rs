use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use bimflow_core::Config;

use crate::api::{AccessToken, TranslationApi};
use crate::error::TranslationError;

const TOKEN_SCOPE: &str = "data:read data:write data:create bucket:create bucket:read";

#[derive(Clone)]
pub struct ForgeCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Debug for ForgeCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ForgeCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// HTTP implementation of [`TranslationApi`] against the Autodesk Platform
/// Services (Forge) OSS and Model Derivative endpoints.
pub struct ForgeApi {
    http_client: Client,
    base_url: Url,
    credentials: Option<ForgeCredentials>,
}

impl Debug for ForgeApi {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ForgeApi")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectDetails {
    object_id: String,
}

impl ForgeApi {
    pub fn new(
        base_url: &str,
        credentials: Option<ForgeCredentials>,
    ) -> Result<Self, TranslationError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            TranslationError::remote(None, format!("Invalid translation base URL: {}", e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(TranslationError::remote(
                None,
                "Translation base URL cannot carry a path",
            ));
        }

        // Per-call deadlines come from the breakers; this bounds a hung connection.
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                TranslationError::remote(None, format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            base_url,
            credentials,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, TranslationError> {
        let credentials = match (config.forge_client_id(), config.forge_client_secret()) {
            (Some(id), Some(secret)) => Some(ForgeCredentials {
                client_id: id.to_string(),
                client_secret: secret.to_string(),
            }),
            _ => None,
        };
        Self::new(config.forge_base_url(), credentials)
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Map a response to an error unless it is 2xx.
    async fn check(response: Response, context: &str) -> Result<Response, TranslationError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TranslationError::Auth(format!(
                "{} rejected with {}: {}",
                context, status, body
            )));
        }
        Err(TranslationError::remote(
            Some(status.as_u16()),
            format!("{} failed: {}", context, body),
        ))
    }

    async fn get_json(&self, token: &str, url: Url, context: &str) -> Result<Value, TranslationError> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| send_error(context, e))?;
        let response = Self::check(response, context).await?;

        // 202 means the remote accepted the request but has nothing yet
        if response.status() == StatusCode::ACCEPTED {
            return Err(TranslationError::remote(
                Some(202),
                format!("{} is still being processed", context),
            ));
        }
        response.json().await.map_err(|e| parse_error(context, e))
    }
}

fn send_error(context: &str, err: reqwest::Error) -> TranslationError {
    TranslationError::remote(
        err.status().map(|s| s.as_u16()),
        format!("{} request failed: {}", context, err),
    )
}

fn parse_error(context: &str, err: reqwest::Error) -> TranslationError {
    TranslationError::remote(None, format!("Failed to parse {} response: {}", context, err))
}

#[async_trait]
impl TranslationApi for ForgeApi {
    async fn fetch_token(&self) -> Result<AccessToken, TranslationError> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            TranslationError::Auth(
                "FORGE_CLIENT_ID and FORGE_CLIENT_SECRET are not configured".to_string(),
            )
        })?;

        let response = self
            .http_client
            .post(self.url(&["authentication", "v2", "token"]))
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", TOKEN_SCOPE)])
            .send()
            .await
            .map_err(|e| send_error("Token", e))?;

        let response = Self::check(response, "Token").await.map_err(|e| match e {
            TranslationError::Remote { status, message } => {
                TranslationError::Auth(format!("token endpoint answered {:?}: {}", status, message))
            }
            other => other,
        })?;
        response.json().await.map_err(|e| parse_error("token", e))
    }

    async fn create_bucket(&self, token: &str, bucket: &str) -> Result<(), TranslationError> {
        let response = self
            .http_client
            .post(self.url(&["oss", "v2", "buckets"]))
            .bearer_auth(token)
            .json(&json!({ "bucketKey": bucket, "policyKey": "transient" }))
            .send()
            .await
            .map_err(|e| send_error("Bucket creation", e))?;

        if response.status() == StatusCode::CONFLICT {
            tracing::debug!(bucket = %bucket, "Bucket already exists");
            return Ok(());
        }
        Self::check(response, "Bucket creation").await?;
        tracing::info!(bucket = %bucket, "Bucket created");
        Ok(())
    }

    async fn upload_object(
        &self,
        token: &str,
        bucket: &str,
        name: &str,
        data: Bytes,
    ) -> Result<String, TranslationError> {
        let size = data.len();
        let response = self
            .http_client
            .put(self.url(&["oss", "v2", "buckets", bucket, "objects", name]))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| send_error("Object upload", e))?;

        let response = Self::check(response, "Object upload").await?;
        let details: ObjectDetails = response
            .json()
            .await
            .map_err(|e| parse_error("object upload", e))?;

        tracing::info!(
            bucket = %bucket,
            object_name = %name,
            size_bytes = size,
            "Object uploaded to translation service"
        );
        Ok(details.object_id)
    }

    async fn submit_job(&self, token: &str, urn: &str) -> Result<(), TranslationError> {
        let body = json!({
            "input": { "urn": urn },
            "output": {
                "destination": { "region": "us" },
                "formats": [{ "type": "svf", "views": ["2d", "3d"] }]
            }
        });
        let response = self
            .http_client
            .post(self.url(&["modelderivative", "v2", "designdata", "job"]))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error("Translation job", e))?;

        Self::check(response, "Translation job").await?;
        tracing::info!(urn = %urn, "Translation job submitted");
        Ok(())
    }

    async fn fetch_manifest(&self, token: &str, urn: &str) -> Result<Value, TranslationError> {
        let url = self.url(&["modelderivative", "v2", "designdata", urn, "manifest"]);
        self.get_json(token, url, "Manifest").await
    }

    async fn fetch_properties(&self, token: &str, urn: &str) -> Result<Value, TranslationError> {
        let metadata = self
            .get_json(
                token,
                self.url(&["modelderivative", "v2", "designdata", urn, "metadata"]),
                "Metadata",
            )
            .await?;

        let guid = metadata
            .pointer("/data/metadata/0/guid")
            .and_then(Value::as_str)
            .ok_or_else(|| TranslationError::remote(None, "Model has no viewable metadata"))?;

        self.get_json(
            token,
            self.url(&[
                "modelderivative",
                "v2",
                "designdata",
                urn,
                "metadata",
                guid,
                "properties",
            ]),
            "Properties",
        )
        .await
    }
}
