use super::{PublishOutcome, PublisherRegistry};
use crate::dispatch::{required_str, JobError, JobHandler};
use crate::export::{ArtifactStore, ExportKey};
use crate::queue::{JobEnvelope, JobParams, QueueCategory};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Runs one publish job: hands the pending artifact to its publisher, then
/// replaces the artifact with a sidecar carrying the outcome.
///
/// A publisher error leaves no sidecar behind; the status poller reports the
/// export as failed once the staleness window has passed.
pub struct PublishJobHandler {
    artifacts: Arc<dyn ArtifactStore>,
    registry: Arc<PublisherRegistry>,
}

impl PublishJobHandler {
    pub fn new(artifacts: Arc<dyn ArtifactStore>, registry: Arc<PublisherRegistry>) -> Self {
        Self {
            artifacts,
            registry,
        }
    }
}

#[async_trait]
impl JobHandler for PublishJobHandler {
    fn category(&self) -> QueueCategory {
        QueueCategory::VideoPublish
    }

    async fn handle(&self, job: &JobEnvelope, params: JobParams) -> Result<(), JobError> {
        let key = match ExportKey::parse(params.get("key"))
            .map_err(|e| JobError::InvalidParams(e.to_string()))?
        {
            ExportKey::Present(key) => key,
            ExportKey::Empty => return Err(JobError::InvalidParams("missing key".to_string())),
        };
        let destination = self
            .registry
            .resolve(required_str(&params, "destination")?)
            .map_err(|e| JobError::InvalidParams(e.to_string()))?;
        let publisher = self
            .registry
            .get(destination)
            .map_err(|e| JobError::InvalidParams(e.to_string()))?;

        if !self.artifacts.pending_exists(&key) {
            return Err(JobError::ExecutionFailed(format!(
                "no artifact pending publish for {}",
                key
            )));
        }

        let file = self.artifacts.pending_path(&key);
        let result = publisher
            .publish(&file, &params)
            .await
            .map_err(|e| JobError::ExecutionFailed(format!("{:#}", e)))?;

        let outcome = PublishOutcome::from(result);
        let sidecar = serde_json::to_string(&outcome)
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
        // The pending artifact goes only once the sidecar is in place.
        self.artifacts
            .write_sidecar(&key, &sidecar)
            .map_err(|e| JobError::ExecutionFailed(format!("failed to write sidecar: {}", e)))?;
        self.artifacts.remove_pending(&key);

        info!(
            "Publish job {} for {} to {} finished: {:?}",
            job.id, key, destination, outcome.url
        );
        Ok(())
    }
}
