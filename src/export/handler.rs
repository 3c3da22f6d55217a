use super::{ArtifactStore, ExportKey};
use crate::dispatch::{required_int, required_str, AckPolicy, JobError, JobHandler};
use crate::queue::{JobEnvelope, JobParams, QueueCategory};
use crate::workers::{Admission, RenderPool, RenderRequest};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Hands export jobs to the external renderer. The renderer writes the
/// artifact to the path it is given; this handler never waits for it.
pub struct ExportJobHandler {
    pool: Arc<RenderPool>,
    artifacts: Arc<dyn ArtifactStore>,
    executable: PathBuf,
    extra_args: Vec<String>,
}

impl ExportJobHandler {
    pub fn new(
        pool: Arc<RenderPool>,
        artifacts: Arc<dyn ArtifactStore>,
        executable: PathBuf,
        extra_args: Vec<String>,
    ) -> Self {
        Self {
            pool,
            artifacts,
            executable,
            extra_args,
        }
    }

    fn build_request(&self, params: &JobParams) -> Result<RenderRequest, JobError> {
        let subject_id = required_int(params, "subjectId")?;
        let width = required_int(params, "width")?;
        let height = required_int(params, "height")?;
        let page = params.get_int("page").max(0);
        let format = required_str(params, "format")?;
        let key = match ExportKey::parse(params.get("key"))
            .map_err(|e| JobError::InvalidParams(e.to_string()))?
        {
            ExportKey::Present(key) => key,
            ExportKey::Empty => return Err(JobError::InvalidParams("missing key".to_string())),
        };
        if key.subject_id != subject_id {
            return Err(JobError::InvalidParams(format!(
                "key {} does not belong to subject {}",
                key, subject_id
            )));
        }

        let output = self.artifacts.prepare_output(&key).map_err(|e| {
            JobError::ExecutionFailed(format!("failed to prepare output for {}: {}", key, e))
        })?;

        let mut args = vec![
            "--subject".to_string(),
            subject_id.to_string(),
            "--width".to_string(),
            width.to_string(),
            "--height".to_string(),
            height.to_string(),
            "--page".to_string(),
            page.to_string(),
            "--format".to_string(),
            format.to_string(),
            "--output".to_string(),
            output.display().to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());

        Ok(RenderRequest {
            executable: self.executable.clone(),
            args,
        })
    }
}

#[async_trait]
impl JobHandler for ExportJobHandler {
    fn category(&self) -> QueueCategory {
        QueueCategory::Export
    }

    fn ack_policy(&self) -> AckPolicy {
        AckPolicy::BeforeProcessing
    }

    async fn handle(&self, job: &JobEnvelope, params: JobParams) -> Result<(), JobError> {
        let request = self.build_request(&params)?;
        debug!("Rendering {}: {:?}", job.label, request.args);

        let admission = self
            .pool
            .submit(request)
            .await
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
        if admission == Admission::OverCapacity {
            info!("Export job {} launched over render capacity", job.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{CorrelationKey, ExportFormat, InMemoryArtifactStore};
    use crate::workers::{ExitFuture, ProcessExit, ProcessLauncher, RenderError};
    use futures::FutureExt;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingLauncher {
        launched: Mutex<Vec<RenderRequest>>,
    }

    impl ProcessLauncher for RecordingLauncher {
        fn launch(&self, request: &RenderRequest) -> Result<ExitFuture, RenderError> {
            self.launched.lock().unwrap().push(request.clone());
            Ok(async {
                ProcessExit {
                    success: true,
                    code: Some(0),
                }
            }
            .boxed())
        }
    }

    fn setup() -> (
        Arc<RecordingLauncher>,
        Arc<InMemoryArtifactStore>,
        ExportJobHandler,
    ) {
        let launcher = Arc::new(RecordingLauncher::default());
        let artifacts = Arc::new(InMemoryArtifactStore::new());
        let pool = Arc::new(RenderPool::new(launcher.clone(), 2, Duration::from_secs(1)));
        let handler = ExportJobHandler::new(
            pool,
            artifacts.clone(),
            PathBuf::from("/opt/renderer/render"),
            vec!["--quiet".to_string()],
        );
        (launcher, artifacts, handler)
    }

    fn export_params(key: &CorrelationKey) -> JobParams {
        JobParams::new()
            .with("subjectId", key.subject_id)
            .with("width", 800)
            .with("height", 450)
            .with("page", 3)
            .with("key", key)
            .with("format", key.format)
    }

    #[tokio::test]
    async fn test_launches_renderer_with_output_path() {
        let (launcher, artifacts, handler) = setup();
        let key = CorrelationKey::new(42, ExportFormat::Mp4);
        let params = export_params(&key);
        let job = JobEnvelope::new("export:video", &params).unwrap();

        handler.handle(&job, params).await.unwrap();

        assert!(artifacts.was_prepared(&key));
        let launched = launcher.launched.lock().unwrap();
        assert_eq!(launched.len(), 1);
        let args = &launched[0].args;
        assert_eq!(&args[..10], &[
            "--subject", "42", "--width", "800", "--height", "450", "--page", "3", "--format", "mp4",
        ]);
        assert_eq!(args[10], "--output");
        assert!(args[11].contains(&key.to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--quiet"));
    }

    #[tokio::test]
    async fn test_missing_dimensions_are_rejected() {
        let (launcher, _artifacts, handler) = setup();
        let key = CorrelationKey::new(42, ExportFormat::Png);
        let mut params = export_params(&key);
        params.set("width", 0);
        let job = JobEnvelope::new("export:image", &params).unwrap();

        assert!(matches!(
            handler.handle(&job, params).await,
            Err(JobError::InvalidParams(_))
        ));
        assert!(launcher.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_key_of_another_subject_is_rejected() {
        let (_launcher, _artifacts, handler) = setup();
        let key = CorrelationKey::new(7, ExportFormat::Png);
        let mut params = export_params(&key);
        params.set("subjectId", 42);
        let job = JobEnvelope::new("export:image", &params).unwrap();

        assert!(handler.handle(&job, params).await.is_err());
    }
}
