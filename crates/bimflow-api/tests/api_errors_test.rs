//! Rejections, lookups of unknown ids and breaker behavior over HTTP.
//!
//! Run with: `cargo test -p bimflow-api --test api_errors_test`

mod helpers;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use helpers::{api_path, setup_test_app, upload_form, ManifestBehavior, IFC_BYTES};
use serde_json::Value;
use std::time::Duration;

#[tokio::test]
async fn executable_upload_is_rejected() {
    let app = setup_test_app(ManifestBehavior::SucceedAfter(0), false).await;

    let response = app
        .client()
        .post(&api_path("/uploads"))
        .multipart(upload_form(
            "setup.exe",
            b"MZ\x90\x00",
            "application/octet-stream",
        ))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_FILE_TYPE");
    assert_eq!(body["recoverable"], false);

    // Nothing staged, nothing queued
    let temp_dir = app.state.config.upload_temp_dir().clone();
    let mut entries = tokio::fs::read_dir(&temp_dir).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
    let leased = app
        .state
        .jobs
        .lease_next("probe", Duration::from_secs(30))
        .await
        .unwrap();
    assert!(leased.is_none());
}

#[tokio::test]
async fn disallowed_mime_type_is_rejected() {
    let app = setup_test_app(ManifestBehavior::SucceedAfter(0), false).await;

    let response = app
        .client()
        .post(&api_path("/uploads"))
        .multipart(upload_form("tower.ifc", IFC_BYTES, "image/png"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "INVALID_FILE_TYPE");
}

#[tokio::test]
async fn upload_without_file_part_is_rejected() {
    let app = setup_test_app(ManifestBehavior::SucceedAfter(0), false).await;

    let response = app
        .client()
        .post(&api_path("/uploads"))
        .multipart(MultipartForm::new().add_text("declaredName", "tower.ifc"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn declared_size_over_limit_is_rejected() {
    let app = setup_test_app(ManifestBehavior::SucceedAfter(0), false).await;

    let form = MultipartForm::new()
        .add_text("declaredName", "tower.ifc")
        .add_text("declaredSize", "10737418240")
        .add_part(
            "file",
            Part::bytes(IFC_BYTES)
                .file_name("tower.ifc")
                .mime_type("application/ifc"),
        );
    let response = app.client().post(&api_path("/uploads")).multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let app = setup_test_app(ManifestBehavior::SucceedAfter(0), false).await;
    let client = app.client();

    client
        .get(&api_path(&format!("/jobs/{}", uuid::Uuid::new_v4())))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    client
        .get(&api_path(&format!("/content/{}", "ab".repeat(32))))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn manifest_breaker_opens_after_repeated_remote_failures() {
    let app = setup_test_app(ManifestBehavior::ServerError, false).await;
    let client = app.client();

    let body: Value = client
        .post(&api_path("/uploads"))
        .multipart(upload_form("tower.ifc", IFC_BYTES, "application/ifc"))
        .await
        .json();
    let content_id = body["contentId"].as_str().unwrap().to_string();

    // Play the worker: claim the job and record a remote handle
    let jobs = app.state.jobs.clone();
    let job = jobs
        .lease_next("test-worker", Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();
    jobs.mark_running(job.job_id, "test-worker", "dXJuOnRlc3Q")
        .await
        .unwrap();

    let manifest_path = api_path(&format!("/content/{}/manifest", content_id));
    for _ in 0..5 {
        let response = client.get(&manifest_path).await;
        response.assert_status(StatusCode::BAD_GATEWAY);
    }
    assert_eq!(app.api.manifest_calls(), 5);

    let rejected = client.get(&manifest_path).await;
    rejected.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let error: Value = rejected.json();
    assert_eq!(error["recoverable"], true);
    assert!(error["suggested_action"].is_string());
    // The open breaker answers without calling the remote
    assert_eq!(app.api.manifest_calls(), 5);

    let breakers: Value = client.get(&api_path("/breakers")).await.json();
    let states: Vec<&str> = breakers["breakers"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|b| b["state"].as_str())
        .collect();
    assert!(states.contains(&"open"), "breakers: {}", breakers);
}

#[tokio::test]
async fn health_and_docs_are_served() {
    let app = setup_test_app(ManifestBehavior::SucceedAfter(0), false).await;
    let client = app.client();

    let live: Value = client.get("/health").await.json();
    assert_eq!(live["status"], "alive");

    let ready = client.get("/health/ready").await;
    ready.assert_status_ok();
    assert_eq!(ready.json::<Value>()["status"], "ready");

    let spec: Value = client.get("/api/openapi.json").await.json();
    assert!(spec["paths"]["/api/v0/uploads"].is_object());

    let breakers: Value = client.get(&api_path("/breakers")).await.json();
    assert!(breakers["breakers"].as_array().unwrap().len() >= 4);
    assert_eq!(breakers["cache"]["entries"], 0);
}
