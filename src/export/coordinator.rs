use super::{ArtifactStore, CorrelationKey, ExportFormat, ExportKey, ExportKind};
use crate::publish::{PublishOutcome, PublisherRegistry};
use crate::queue::{DurableQueue, JobParams};
use chrono::Utc;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// How many consumed keys are remembered to answer repeat polls.
const CONSUMED_KEYS_CAPACITY: usize = 4096;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("subject id must be positive")]
    InvalidSubject,

    #[error("dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: i64, height: i64 },

    #[error("page must not be negative")]
    InvalidPage,

    #[error("{kind} exports cannot be {format}")]
    UnsupportedFormat {
        kind: ExportKind,
        format: ExportFormat,
    },

    #[error("continuation must not be empty")]
    EmptyContinuation,

    #[error(transparent)]
    Destination(#[from] crate::publish::PublishError),

    #[error("no artifact for {0}")]
    ArtifactMissing(String),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ExportError {
    /// Whether the caller sent something unusable, as opposed to a failure
    /// on this side.
    pub fn is_invalid_input(&self) -> bool {
        !matches!(
            self,
            ExportError::ArtifactMissing(_)
                | ExportError::Internal(_)
                | ExportError::Destination(crate::publish::PublishError::NotConfigured(_))
        )
    }
}

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub kind: ExportKind,
    pub subject_id: i64,
    pub width: i64,
    pub height: Option<i64>,
    pub page: Option<i64>,
    pub format: Option<ExportFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportState {
    NotReady,
    Ready,
    Publish,
    Published,
    Failed,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub status: ExportState,
    pub key: String,
    pub url: Option<String>,
}

impl StatusReport {
    fn new(status: ExportState, key: &ExportKey) -> Self {
        Self {
            status,
            key: key.as_key().map(|k| k.to_string()).unwrap_or_default(),
            url: None,
        }
    }
}

/// Drives an export from request to consumed status.
///
/// The coordinator owns no background work: it enqueues render and publish
/// jobs and reads the artifact store to tell the caller where an export
/// stands.
pub struct ExportCoordinator {
    artifacts: Arc<dyn ArtifactStore>,
    export_queue: Arc<dyn DurableQueue>,
    publish_queue: Arc<dyn DurableQueue>,
    publishers: Arc<PublisherRegistry>,
    status_timeout: Duration,
    consumed: Mutex<VecDeque<CorrelationKey>>,
}

impl ExportCoordinator {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        export_queue: Arc<dyn DurableQueue>,
        publish_queue: Arc<dyn DurableQueue>,
        publishers: Arc<PublisherRegistry>,
        status_timeout: Duration,
    ) -> Self {
        Self {
            artifacts,
            export_queue,
            publish_queue,
            publishers,
            status_timeout,
            consumed: Mutex::new(VecDeque::new()),
        }
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    /// Validate the request and enqueue a render job for it.
    pub fn create(&self, request: &ExportRequest) -> Result<CorrelationKey, ExportError> {
        if request.subject_id <= 0 {
            return Err(ExportError::InvalidSubject);
        }
        let height = request
            .height
            .unwrap_or_else(|| (request.width * 9 / 16).max(1));
        if request.width <= 0 || height <= 0 {
            return Err(ExportError::InvalidDimensions {
                width: request.width,
                height,
            });
        }
        let page = request.page.unwrap_or(0);
        if page < 0 {
            return Err(ExportError::InvalidPage);
        }
        let format = request.format.unwrap_or(request.kind.default_format());
        if !request.kind.supports(format) {
            return Err(ExportError::UnsupportedFormat {
                kind: request.kind,
                format,
            });
        }

        let key = CorrelationKey::new(request.subject_id, format);
        let params = JobParams::new()
            .with("subjectId", request.subject_id)
            .with("width", request.width)
            .with("height", height)
            .with("page", page)
            .with("key", key)
            .with("format", format);
        self.export_queue
            .submit(&format!("export:{}", request.kind), &params)?;

        info!(
            "Queued {} export of subject {} ({}x{}, page {}) as {}",
            request.kind, request.subject_id, request.width, height, page, key
        );
        Ok(key)
    }

    /// Where an export stands. With a non-empty `continuation` a ready
    /// artifact is handed to the named publish destination instead.
    pub fn status(
        &self,
        key: &ExportKey,
        continuation: Option<&str>,
    ) -> Result<StatusReport, ExportError> {
        let Some(correlation_key) = key.as_key() else {
            return Ok(StatusReport::new(ExportState::NotFound, key));
        };

        if let Some(contents) = self.artifacts.take_sidecar(correlation_key) {
            self.artifacts.remove_artifact(correlation_key);
            self.artifacts.remove_pending(correlation_key);
            self.remember_consumed(correlation_key);

            let outcome = serde_json::from_str::<PublishOutcome>(&contents).unwrap_or_else(|e| {
                warn!("Unreadable sidecar for {}: {}", correlation_key, e);
                PublishOutcome {
                    success: Some(false),
                    url: None,
                }
            });
            let status = if outcome.is_success() {
                ExportState::Published
            } else {
                ExportState::Failed
            };
            return Ok(StatusReport {
                url: outcome.url,
                ..StatusReport::new(status, key)
            });
        }

        if self.artifacts.artifact_exists(correlation_key) {
            return match continuation.map(str::trim).filter(|c| !c.is_empty()) {
                Some(destination) => match self.request_publish(correlation_key, destination) {
                    Ok(()) => Ok(StatusReport::new(ExportState::Publish, key)),
                    // Another poll won the rename; report what it left behind.
                    Err(ExportError::ArtifactMissing(_)) => {
                        let status = if self.artifacts.pending_exists(correlation_key) {
                            ExportState::Publish
                        } else {
                            ExportState::NotReady
                        };
                        Ok(StatusReport::new(status, key))
                    }
                    Err(err) => Err(err),
                },
                None => Ok(StatusReport::new(ExportState::Ready, key)),
            };
        }

        let stale = self.is_stale(correlation_key);
        let status = if self.artifacts.pending_exists(correlation_key) {
            if stale {
                ExportState::Failed
            } else {
                ExportState::NotReady
            }
        } else if stale || self.was_consumed(correlation_key) {
            ExportState::NotFound
        } else {
            ExportState::NotReady
        };
        Ok(StatusReport::new(status, key))
    }

    /// Rename a ready artifact to its pending name, then enqueue the publish
    /// job. The rename comes first so no poller sees the artifact as ready
    /// once a publish job exists for it.
    pub fn request_publish(
        &self,
        key: &CorrelationKey,
        continuation: &str,
    ) -> Result<(), ExportError> {
        let continuation = continuation.trim();
        if continuation.is_empty() {
            return Err(ExportError::EmptyContinuation);
        }
        let destination = self.publishers.resolve(continuation)?;

        if self.artifacts.mark_pending_publish(key).is_err() {
            return Err(ExportError::ArtifactMissing(key.to_string()));
        }

        let params = JobParams::new()
            .with("key", key)
            .with("destination", destination);
        if let Err(err) = self
            .publish_queue
            .submit(&format!("publish:{}", destination), &params)
        {
            if let Err(restore_err) = self.artifacts.unmark_pending_publish(key) {
                warn!("Failed to restore artifact {}: {}", key, restore_err);
            }
            return Err(err.into());
        }

        info!("Queued publish of {} to {}", key, destination);
        Ok(())
    }

    fn is_stale(&self, key: &CorrelationKey) -> bool {
        let age = Utc::now().signed_duration_since(key.created);
        age.to_std().map(|age| age > self.status_timeout).unwrap_or(false)
    }

    fn remember_consumed(&self, key: &CorrelationKey) {
        let mut consumed = self.consumed.lock().unwrap();
        if consumed.len() == CONSUMED_KEYS_CAPACITY {
            consumed.pop_front();
        }
        consumed.push_back(*key);
    }

    fn was_consumed(&self, key: &CorrelationKey) -> bool {
        self.consumed.lock().unwrap().contains(key)
    }
}
