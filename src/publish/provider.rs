//! Upload to the external video provider.

use super::{PublishResult, Publisher};
use crate::queue::JobParams;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: Option<String>,
    path: Option<String>,
}

pub struct ProviderPublisher {
    client: reqwest::Client,
    base_url: String,
}

impl ProviderPublisher {
    pub fn new(base_url: String, timeout_sec: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .expect("Failed to create HTTP client");

        let base_url = base_url.trim_end_matches('/').to_string();

        Self { client, base_url }
    }
}

#[async_trait]
impl Publisher for ProviderPublisher {
    async fn publish(&self, file: &Path, params: &JobParams) -> Result<PublishResult> {
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().replace("-pending-publish", ""))
            .unwrap_or_else(|| "export".to_string());
        let handle = tokio::fs::File::open(file)
            .await
            .with_context(|| format!("Failed to open {:?}", file))?;
        let length = handle.metadata().await?.len();

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(ReaderStream::new(handle)), length)
            .file_name(file_name);
        let mut form = Form::new().part("file", part);
        if let Some(title) = params.get("title") {
            form = form.text("title", title.to_string());
        }

        let url = format!("{}/upload", self.base_url);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .context("Failed to connect to provider")?;

        if !response.status().is_success() {
            warn!("Provider refused upload of {:?}: {}", file, response.status());
            return Ok(PublishResult { url: None });
        }

        let body: UploadResponse = response
            .json()
            .await
            .context("Failed to parse provider upload response")?;
        let url = body
            .url
            .or_else(|| body.path.map(|path| format!("{}/{}", self.base_url, path.trim_start_matches('/'))));

        info!("Uploaded {:?} to provider: {:?}", file, url);
        Ok(PublishResult { url })
    }
}
