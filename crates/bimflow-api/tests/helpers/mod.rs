//! Test helpers: an in-process translation service and a fully wired app.
//!
//! Everything runs against in-memory repositories and a temp-dir content
//! store, so no external services are needed.

#![allow(dead_code)]

use async_trait::async_trait;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use bimflow_api::constants;
use bimflow_api::setup::database::Repositories;
use bimflow_api::setup::{routes, services, storage};
use bimflow_api::state::AppState;
use bimflow_core::{Config, PipelineConfig};
use bimflow_translation::{AccessToken, TranslationApi, TranslationError};
use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const IFC_BYTES: &[u8] = b"ISO-10303-21;\nHEADER;\nFILE_NAME('tower.ifc');\nENDSEC;\nDATA;\nENDSEC;\nEND-ISO-10303-21;\n";

pub fn api_path(path: &str) -> String {
    format!("{}{}", constants::API_PREFIX, path)
}

/// What the fake remote answers to manifest polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestBehavior {
    /// `inprogress` for the first `n` polls, then `success`.
    SucceedAfter(usize),
    /// Translation finishes with `status: failed`.
    Fail,
    /// Every manifest request is a 500.
    ServerError,
}

/// In-process stand-in for the model-derivative service. Counts every call.
pub struct FakeTranslationApi {
    pub behavior: Mutex<ManifestBehavior>,
    pub token_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub manifest_calls: AtomicUsize,
    pub properties_calls: AtomicUsize,
    /// When set, job submission is rejected with a 400.
    pub reject_submit: AtomicBool,
}

impl FakeTranslationApi {
    pub fn new(behavior: ManifestBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            token_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            manifest_calls: AtomicUsize::new(0),
            properties_calls: AtomicUsize::new(0),
            reject_submit: AtomicBool::new(false),
        }
    }

    pub fn manifest_calls(&self) -> usize {
        self.manifest_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn properties_calls(&self) -> usize {
        self.properties_calls.load(Ordering::SeqCst)
    }

    fn behavior(&self) -> ManifestBehavior {
        *self.behavior.lock().unwrap()
    }
}

pub fn sample_properties() -> Value {
    json!({
        "data": {
            "type": "properties",
            "collection": [
                {
                    "objectid": 1,
                    "name": "Basic Wall [1001]",
                    "properties": {
                        "Dimensions": { "Area": "12.5 m^2", "Length": "5 m", "Volume": "2.5 m^3" }
                    }
                },
                {
                    "objectid": 2,
                    "name": "Basic Wall [1002]",
                    "properties": {
                        "Dimensions": { "Area": "7.5 m^2", "Length": "3 m" }
                    }
                },
                {
                    "objectid": 3,
                    "name": "Door [2001]",
                    "properties": { "Identity Data": { "Mark": "D1" } }
                }
            ]
        }
    })
}

#[async_trait]
impl TranslationApi for FakeTranslationApi {
    async fn fetch_token(&self) -> Result<AccessToken, TranslationError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        Ok(AccessToken {
            access_token: "test-token".to_string(),
            expires_in: 3600,
        })
    }

    async fn create_bucket(&self, _token: &str, _bucket: &str) -> Result<(), TranslationError> {
        Ok(())
    }

    async fn upload_object(
        &self,
        _token: &str,
        bucket: &str,
        name: &str,
        _data: Bytes,
    ) -> Result<String, TranslationError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("urn:adsk.objects:os.object:{}/{}", bucket, name))
    }

    async fn submit_job(&self, _token: &str, _urn: &str) -> Result<(), TranslationError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_submit.load(Ordering::SeqCst) {
            return Err(TranslationError::remote(
                Some(400),
                "Input file type is not supported",
            ));
        }
        Ok(())
    }

    async fn fetch_manifest(&self, _token: &str, urn: &str) -> Result<Value, TranslationError> {
        let call = self.manifest_calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior() {
            ManifestBehavior::SucceedAfter(pending) if call < pending => Ok(json!({
                "urn": urn,
                "status": "inprogress",
                "progress": "50% complete"
            })),
            ManifestBehavior::SucceedAfter(_) => Ok(json!({
                "urn": urn,
                "status": "success",
                "progress": "complete",
                "derivatives": [{ "outputType": "svf", "status": "success" }]
            })),
            ManifestBehavior::Fail => Ok(json!({
                "urn": urn,
                "status": "failed",
                "progress": "complete",
                "derivatives": [{
                    "status": "failed",
                    "messages": [{ "type": "error", "message": "Unsupported IFC schema" }]
                }]
            })),
            ManifestBehavior::ServerError => {
                Err(TranslationError::remote(Some(500), "internal server error"))
            }
        }
    }

    async fn fetch_properties(&self, _token: &str, _urn: &str) -> Result<Value, TranslationError> {
        self.properties_calls.fetch_add(1, Ordering::SeqCst);
        Ok(sample_properties())
    }
}

pub fn test_config(dir: &TempDir) -> Config {
    Config::from(test_pipeline_config(dir))
}

pub fn test_pipeline_config(dir: &TempDir) -> PipelineConfig {
    PipelineConfig {
        local_storage_path: dir.path().join("store"),
        upload_temp_dir: dir.path().join("temp"),
        max_upload_size_bytes: 64 * 1024,
        storage_max_retries: 0,
        job_poll_interval_ms: 20,
        job_backoff_base_ms: 10,
        job_max_backoff_secs: 1,
        job_timeout_secs: 10,
        job_lease_secs: 15,
        forge_poll_initial_ms: 5,
        forge_poll_max_ms: 20,
        ..Default::default()
    }
}

/// Test application: server, shared state and the fake remote.
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub api: Arc<FakeTranslationApi>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Poll the job endpoint until the job reaches a terminal state.
    pub async fn wait_for_job(&self, job_id: &str) -> Value {
        for _ in 0..250 {
            let job: Value = self
                .server
                .get(&api_path(&format!("/jobs/{}", job_id)))
                .await
                .json();
            if matches!(job["state"].as_str(), Some("succeeded" | "failed-terminal")) {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {} did not finish in time", job_id);
    }
}

pub async fn setup_test_app(behavior: ManifestBehavior, start_workers: bool) -> TestApp {
    setup_test_app_with(behavior, start_workers, Repositories::in_memory(), |_| {}).await
}

/// Like [`setup_test_app`], with custom repositories and config overrides.
pub async fn setup_test_app_with(
    behavior: ManifestBehavior,
    start_workers: bool,
    repositories: Repositories,
    customize: impl FnOnce(&mut PipelineConfig),
) -> TestApp {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut pipeline = test_pipeline_config(&temp_dir);
    customize(&mut pipeline);
    let config = Config::from(pipeline);

    let storage = storage::setup_storage(&config).await.unwrap();
    let api = Arc::new(FakeTranslationApi::new(behavior));
    let state = services::initialize_services(
        &config,
        storage,
        repositories,
        api.clone(),
        start_workers,
    )
    .unwrap();
    let router = routes::setup_routes(&config, state.clone()).unwrap();

    TestApp {
        server: TestServer::new(router).unwrap(),
        state,
        api,
        _temp_dir: temp_dir,
    }
}

pub fn upload_form(name: &str, data: &'static [u8], mime: &str) -> MultipartForm {
    MultipartForm::new().add_text("declaredName", name).add_part(
        "file",
        Part::bytes(data).file_name(name).mime_type(mime),
    )
}
