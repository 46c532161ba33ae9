//! Upload → translate → results, end to end over HTTP.
//!
//! Run with: `cargo test -p bimflow-api --test pipeline_test`

mod helpers;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use bimflow_api::setup::database::Repositories;
use helpers::{
    api_path, setup_test_app, setup_test_app_with, upload_form, ManifestBehavior, IFC_BYTES,
};
use serde_json::Value;

#[tokio::test]
async fn ifc_upload_is_translated_and_served_from_cache() {
    let app = setup_test_app(ManifestBehavior::SucceedAfter(2), true).await;
    let client = app.client();

    let response = client
        .post(&api_path("/uploads"))
        .add_header("X-User-Id", "site-engineer")
        .multipart(upload_form("tower.ifc", IFC_BYTES, "application/ifc"))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["status"], "staged");
    let content_id = body["contentId"].as_str().unwrap().to_string();
    let job_id = body["jobId"].as_str().unwrap().to_string();
    assert_eq!(content_id.len(), 64);

    let job = app.wait_for_job(&job_id).await;
    assert_eq!(job["state"], "succeeded", "job: {}", job);
    assert_eq!(job["contentId"], content_id.as_str());
    assert_eq!(job["fileName"], "tower.ifc");
    assert_eq!(job["requestedBy"], "site-engineer");
    assert_eq!(job["attempts"], 1);

    let manifest_calls = app.api.manifest_calls();
    let properties_calls = app.api.properties_calls();
    assert!(manifest_calls >= 3);

    let manifest = client
        .get(&api_path(&format!("/content/{}/manifest", content_id)))
        .await;
    manifest.assert_status_ok();
    assert_eq!(manifest.header("x-cache"), "HIT");
    assert_eq!(manifest.json::<Value>()["status"], "success");

    let properties = client
        .get(&api_path(&format!("/content/{}/properties", content_id)))
        .await;
    properties.assert_status_ok();
    assert_eq!(properties.header("x-cache"), "HIT");

    let quantities = client
        .get(&api_path(&format!("/content/{}/quantities", content_id)))
        .await;
    quantities.assert_status_ok();
    assert_eq!(quantities.header("x-cache"), "HIT");
    let takeoff: Value = quantities.json();
    let walls = takeoff["counts"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["category"] == "Basic Wall")
        .unwrap();
    assert_eq!(walls["count"], 2);

    // Cached reads never reach the remote service
    assert_eq!(app.api.manifest_calls(), manifest_calls);
    assert_eq!(app.api.properties_calls(), properties_calls);

    let record: Value = client
        .get(&api_path(&format!("/content/{}", content_id)))
        .await
        .json();
    assert_eq!(record["originalName"], "tower.ifc");
    assert_eq!(record["size"], IFC_BYTES.len());
    assert_eq!(record["contentType"], "application/ifc");

    app.state.shutdown().await;
}

#[tokio::test]
async fn duplicate_upload_returns_existing_job() {
    let app = setup_test_app(ManifestBehavior::SucceedAfter(0), false).await;
    let client = app.client();

    let first: Value = client
        .post(&api_path("/uploads"))
        .multipart(upload_form("tower.ifc", IFC_BYTES, "application/ifc"))
        .await
        .json();

    let second = client
        .post(&api_path("/uploads"))
        .multipart(upload_form("tower-copy.ifc", IFC_BYTES, "application/ifc"))
        .await;
    second.assert_status_ok();
    let second: Value = second.json();

    assert_eq!(second["status"], "duplicate");
    assert_eq!(second["contentId"], first["contentId"]);
    assert_eq!(second["jobId"], first["jobId"]);
}

#[tokio::test]
async fn failed_translation_is_terminal_without_retries() {
    let app = setup_test_app(ManifestBehavior::Fail, true).await;
    let client = app.client();

    let body: Value = client
        .post(&api_path("/uploads"))
        .multipart(upload_form("tower.ifc", IFC_BYTES, "application/ifc"))
        .await
        .json();
    let job = app
        .wait_for_job(body["jobId"].as_str().unwrap())
        .await;

    assert_eq!(job["state"], "failed-terminal");
    assert_eq!(job["attempts"], 1);
    assert!(job["lastError"]
        .as_str()
        .unwrap()
        .contains("Unsupported IFC schema"));

    app.state.shutdown().await;
}

#[tokio::test]
async fn results_before_submission_are_not_found() {
    let app = setup_test_app(ManifestBehavior::SucceedAfter(0), false).await;
    let client = app.client();

    let body: Value = client
        .post(&api_path("/uploads"))
        .multipart(upload_form("tower.ifc", IFC_BYTES, "application/ifc"))
        .await
        .json();
    let content_id = body["contentId"].as_str().unwrap();

    let response = client
        .get(&api_path(&format!("/content/{}/manifest", content_id)))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(app.api.manifest_calls(), 0);
}

#[tokio::test]
async fn ten_megabyte_model_is_stored_and_translated() {
    let app = setup_test_app_with(
        ManifestBehavior::SucceedAfter(1),
        true,
        Repositories::in_memory(),
        |config| config.max_upload_size_bytes = 32 * 1024 * 1024,
    )
    .await;

    let mut model = IFC_BYTES.to_vec();
    model.resize(10 * 1024 * 1024, b' ');
    let size = model.len();
    let form = MultipartForm::new().add_text("declaredName", "campus.ifc").add_part(
        "file",
        Part::bytes(model)
            .file_name("campus.ifc")
            .mime_type("application/ifc"),
    );

    let response = app
        .client()
        .post(&api_path("/uploads"))
        .multipart(form)
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    let content_id = body["contentId"].as_str().unwrap().to_string();

    let record: Value = app
        .client()
        .get(&api_path(&format!("/content/{}", content_id)))
        .await
        .json();
    assert_eq!(record["size"], size);

    let job = app.wait_for_job(body["jobId"].as_str().unwrap()).await;
    assert_eq!(job["state"], "succeeded", "job: {}", job);
    assert_eq!(app.api.upload_calls(), 1);

    // Nothing left behind in the staging directory
    let temp_dir = app.state.config.upload_temp_dir().clone();
    let mut entries = tokio::fs::read_dir(&temp_dir).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());

    app.state.shutdown().await;
}
