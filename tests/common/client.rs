//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per route. When API routes or request
//! formats change, update only this file.

use super::constants::*;
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    pub async fn home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Home request failed")
    }

    // ========================================================================
    // Export Endpoints
    // ========================================================================

    pub async fn create_export(&self, kind: &str, subject_id: i64, width: i64) -> Response {
        self.create_export_with_body(kind, json!({ "subject_id": subject_id, "width": width }))
            .await
    }

    pub async fn create_export_with_body(&self, kind: &str, body: Value) -> Response {
        self.client
            .post(format!("{}/export/{}/create", self.base_url, kind))
            .json(&body)
            .send()
            .await
            .expect("Create export request failed")
    }

    /// Create an export and return its key, asserting success.
    pub async fn create_export_key(&self, kind: &str, subject_id: i64, width: i64) -> String {
        let response = self.create_export(kind, subject_id, width).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.expect("Invalid create response");
        body["key"]
            .as_str()
            .expect("Create response without key")
            .to_string()
    }

    pub async fn export_status(
        &self,
        kind: &str,
        key: &str,
        continuation: Option<&str>,
    ) -> Response {
        let mut query = vec![("key", key)];
        if let Some(continuation) = continuation {
            query.push(("continuation", continuation));
        }
        self.client
            .get(format!("{}/export/{}/status", self.base_url, kind))
            .query(&query)
            .send()
            .await
            .expect("Export status request failed")
    }

    // ========================================================================
    // Provider Endpoints
    // ========================================================================

    pub async fn sidecar_status(&self, path: &str) -> Response {
        self.client
            .get(format!("{}/status", self.base_url))
            .query(&[("key", path)])
            .send()
            .await
            .expect("Sidecar status request failed")
    }

    pub async fn upload(&self, file_name: &str, contents: Vec<u8>) -> Response {
        let form = Form::new().part("file", Part::bytes(contents).file_name(file_name.to_string()));
        self.client
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .expect("Upload request failed")
    }

    pub async fn upload_form(&self, form: Form) -> Response {
        self.client
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .expect("Upload request failed")
    }

    pub async fn continue_export(&self, key: &str, continuation: &str) -> Response {
        self.client
            .get(format!("{}/continue", self.base_url))
            .query(&[("key", key), ("continuation", continuation)])
            .send()
            .await
            .expect("Continue request failed")
    }
}
