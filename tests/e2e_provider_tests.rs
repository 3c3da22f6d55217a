//! End-to-end tests for the provider-facing routes

mod common;

use common::{TestClient, TestServer, SUBJECT_ID};
use export_pipeline::export::{ArtifactStore, CorrelationKey, ExportFormat};
use export_pipeline::publish::{ProviderPublisher, Publisher};
use export_pipeline::queue::{DurableQueue, JobParams};
use reqwest::multipart::Form;
use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn test_upload_stores_file_under_export_root() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.upload("my clip.mp4", b"video bytes".to_vec()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    let path = body["path"].as_str().unwrap();
    assert!(path.starts_with("uploads/"));
    assert!(path.ends_with("-my_clip.mp4"));
    let stored = server.export_root().join(path);
    assert_eq!(std::fs::read(stored).unwrap(), b"video bytes");
}

#[tokio::test]
async fn test_upload_without_file_is_rejected() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client
        .upload_form(Form::new().text("title", "no file here"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sidecar_is_served_once() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let key = CorrelationKey::new(SUBJECT_ID, ExportFormat::Mp4);
    server
        .artifacts
        .write_sidecar(&key, r#"{"url":"https://example.com/v/1"}"#)
        .unwrap();
    let path = server.relative_artifact_path(&key);

    let response = client.sidecar_status(&path).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["url"], "https://example.com/v/1");

    let response = client.sidecar_status(&path).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sidecar_paths_cannot_escape_export_root() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.sidecar_status("../../etc/passwd").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client.sidecar_status("").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_continue_hands_artifact_to_publishing() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let key = CorrelationKey::new(SUBJECT_ID, ExportFormat::Mp4);
    server.write_artifact(&key);

    let response = client.continue_export(&key.to_string(), "directory").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "publish");

    assert!(!server.artifacts.artifact_exists(&key));
    assert!(server.artifacts.pending_exists(&key));
    let jobs = server.publish_queue.snapshot().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].label, "publish:directory");
}

#[tokio::test]
async fn test_continue_errors() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());
    let key = CorrelationKey::new(SUBJECT_ID, ExportFormat::Mp4);

    // Nothing rendered
    let response = client.continue_export(&key.to_string(), "directory").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client.continue_export("garbage", "directory").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    server.write_artifact(&key);
    let response = client.continue_export(&key.to_string(), "").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(server.artifacts.artifact_exists(&key));
    assert_eq!(server.publish_queue.depth().unwrap(), 0);
}

#[tokio::test]
async fn test_provider_publisher_uploads_to_provider_routes() {
    let server = TestServer::spawn().await;
    let source_dir = tempfile::TempDir::new().unwrap();
    let source = source_dir.path().join("1,42,abc,mp4-pending-publish.mp4");
    std::fs::write(&source, b"published video").unwrap();

    let publisher = ProviderPublisher::new(server.base_url.clone(), 10);
    let result = publisher
        .publish(&source, &JobParams::new().with("title", "Quarterly review"))
        .await
        .unwrap();

    let url = result.url.expect("Upload should produce a URL");
    let prefix = format!("{}/uploads/", server.base_url);
    assert!(url.starts_with(&prefix));
    let relative = url.trim_start_matches(&format!("{}/", server.base_url));
    assert_eq!(
        std::fs::read(server.export_root().join(relative)).unwrap(),
        b"published video"
    );
}
