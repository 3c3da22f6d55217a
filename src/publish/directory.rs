use super::{PublishResult, Publisher};
use crate::queue::JobParams;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Publishes by copying into a directory served at `base_url`.
pub struct DirectoryPublisher {
    public_dir: PathBuf,
    base_url: String,
}

impl DirectoryPublisher {
    pub fn new(public_dir: PathBuf, base_url: String) -> Self {
        Self {
            public_dir,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Publisher for DirectoryPublisher {
    async fn publish(&self, file: &Path, _params: &JobParams) -> Result<PublishResult> {
        let name = file
            .file_name()
            .context("Publish source has no file name")?
            .to_string_lossy()
            .replace("-pending-publish", "")
            .replace(',', "_");

        tokio::fs::create_dir_all(&self.public_dir)
            .await
            .with_context(|| format!("Failed to create {:?}", self.public_dir))?;
        tokio::fs::copy(file, self.public_dir.join(&name))
            .await
            .with_context(|| format!("Failed to copy {:?} into {:?}", file, self.public_dir))?;

        Ok(PublishResult {
            url: Some(format!("{}/{}", self.base_url, name)),
        })
    }
}
