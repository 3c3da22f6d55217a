use super::job::{AckPolicy, JobError, JobHandler};
use super::single_flight::SingleFlight;
use crate::queue::{DurableQueue, JobEnvelope};
use crate::server::metrics;
use anyhow::Result;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick of the same loop was still running.
    Skipped,
    /// Queue was empty.
    Idle,
    Processed { processed: usize, failed: usize },
}

/// Sequential consumer bound to one queue category.
///
/// Each tick snapshots the queue, runs every job through the handler one
/// after the other, and acknowledges the batch according to the handler's
/// [`AckPolicy`]. Failed jobs are acknowledged too: the pipeline never
/// retries a job on its own.
pub struct DispatchLoop {
    queue: Arc<dyn DurableQueue>,
    handler: Arc<dyn JobHandler>,
    in_flight: SingleFlight,
}

impl DispatchLoop {
    pub fn new(queue: Arc<dyn DurableQueue>, handler: Arc<dyn JobHandler>) -> Self {
        if queue.category() != handler.category() {
            warn!(
                "Dispatch loop pairs {} queue with {} handler",
                queue.category(),
                handler.category()
            );
        }
        Self {
            queue,
            handler,
            in_flight: SingleFlight::new(),
        }
    }

    pub fn category_name(&self) -> &'static str {
        self.queue.category().as_str()
    }

    pub async fn tick(&self) -> Result<TickOutcome> {
        let category = self.category_name();

        let Some(_guard) = self.in_flight.try_enter() else {
            debug!("{} dispatch still running, skipping tick", category);
            metrics::record_dispatch_tick(category, "skipped");
            return Ok(TickOutcome::Skipped);
        };

        let jobs = self.queue.snapshot()?;
        if jobs.is_empty() {
            metrics::record_dispatch_tick(category, "idle");
            metrics::set_queue_depth(category, 0);
            return Ok(TickOutcome::Idle);
        }

        let ack_policy = self.handler.ack_policy();
        if ack_policy == AckPolicy::BeforeProcessing {
            let ids: Vec<String> = jobs.iter().map(|job| job.id.clone()).collect();
            self.queue.remove(&ids)?;
        }

        let mut handled = Vec::with_capacity(jobs.len());
        let mut failures: Vec<(String, JobError)> = Vec::new();
        for job in &jobs {
            let result = self.run_job(job).await;
            metrics::record_job_result(category, result.is_ok());
            handled.push(job.id.clone());
            if let Err(err) = result {
                failures.push((job.id.clone(), err));
            }
        }

        if ack_policy == AckPolicy::AfterBatch {
            if let Err(err) = self.queue.remove(&handled) {
                error!(
                    "Failed to acknowledge {} {} jobs, they will be delivered again: {:#}",
                    handled.len(),
                    category,
                    err
                );
            }
        }

        if !failures.is_empty() {
            let details = failures
                .iter()
                .map(|(id, err)| format!("{}: {}", id, err))
                .collect::<Vec<_>>()
                .join("; ");
            error!(
                "{} of {} {} jobs failed: {}",
                failures.len(),
                jobs.len(),
                category,
                details
            );
        }

        if let Ok(depth) = self.queue.depth() {
            metrics::set_queue_depth(category, depth);
        }
        metrics::record_dispatch_tick(category, "processed");

        Ok(TickOutcome::Processed {
            processed: handled.len(),
            failed: failures.len(),
        })
    }

    async fn run_job(&self, job: &JobEnvelope) -> Result<(), JobError> {
        let params = job.params()?;
        debug!("Running {} job {} ({})", self.category_name(), job.id, job.label);

        AssertUnwindSafe(self.handler.handle(job, params))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(JobError::Panicked(panic_message(panic.as_ref()))))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{InMemoryQueue, JobParams, QueueCategory};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingHandler {
        ack_policy: AckPolicy,
        seen: Mutex<Vec<String>>,
        delay: Option<Duration>,
        queue_depth_during_handle: Mutex<Vec<usize>>,
        queue: Option<Arc<InMemoryQueue>>,
    }

    impl RecordingHandler {
        fn new(ack_policy: AckPolicy) -> Self {
            Self {
                ack_policy,
                seen: Mutex::new(Vec::new()),
                delay: None,
                queue_depth_during_handle: Mutex::new(Vec::new()),
                queue: None,
            }
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobHandler for RecordingHandler {
        fn category(&self) -> QueueCategory {
            QueueCategory::Email
        }

        fn ack_policy(&self) -> AckPolicy {
            self.ack_policy
        }

        async fn handle(&self, _job: &JobEnvelope, params: JobParams) -> Result<(), JobError> {
            if let Some(queue) = &self.queue {
                self.queue_depth_during_handle
                    .lock()
                    .unwrap()
                    .push(queue.depth().unwrap());
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let name = params.get("name").unwrap_or_default().to_string();
            self.seen.lock().unwrap().push(name.clone());
            match name.as_str() {
                "fail" => Err(JobError::ExecutionFailed("requested failure".to_string())),
                "panic" => panic!("handler blew up"),
                _ => Ok(()),
            }
        }
    }

    fn queue_with(names: &[&str]) -> Arc<InMemoryQueue> {
        let queue = Arc::new(InMemoryQueue::new(QueueCategory::Email));
        for name in names {
            queue
                .submit("email", &JobParams::new().with("name", name))
                .unwrap();
        }
        queue
    }

    #[tokio::test]
    async fn test_empty_queue_is_idle() {
        let dispatch = DispatchLoop::new(
            queue_with(&[]),
            Arc::new(RecordingHandler::new(AckPolicy::AfterBatch)),
        );
        assert_eq!(dispatch.tick().await.unwrap(), TickOutcome::Idle);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch_and_are_acknowledged() {
        let queue = queue_with(&["a", "fail", "panic", "b"]);
        let handler = Arc::new(RecordingHandler::new(AckPolicy::AfterBatch));
        let dispatch = DispatchLoop::new(queue.clone(), handler.clone());

        let outcome = dispatch.tick().await.unwrap();

        assert_eq!(
            outcome,
            TickOutcome::Processed {
                processed: 4,
                failed: 2
            }
        );
        assert_eq!(handler.seen(), vec!["a", "fail", "b"]);
        assert_eq!(queue.depth().unwrap(), 0);
        // A later tick does not see the failed jobs again.
        assert_eq!(dispatch.tick().await.unwrap(), TickOutcome::Idle);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_a_job_failure() {
        let queue = queue_with(&["a"]);
        queue
            .enqueue(vec![JobEnvelope {
                id: "broken".to_string(),
                label: "email".to_string(),
                payload: "{not a bag".to_string(),
                created: chrono::Utc::now(),
            }])
            .unwrap();
        let handler = Arc::new(RecordingHandler::new(AckPolicy::AfterBatch));
        let dispatch = DispatchLoop::new(queue.clone(), handler.clone());

        let outcome = dispatch.tick().await.unwrap();

        assert_eq!(
            outcome,
            TickOutcome::Processed {
                processed: 2,
                failed: 1
            }
        );
        assert_eq!(handler.seen(), vec!["a"]);
        assert_eq!(queue.depth().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_before_processing_acknowledges_up_front() {
        let queue = queue_with(&["a", "b"]);
        let mut handler = RecordingHandler::new(AckPolicy::BeforeProcessing);
        handler.queue = Some(queue.clone());
        let handler = Arc::new(handler);
        let dispatch = DispatchLoop::new(queue.clone(), handler.clone());

        dispatch.tick().await.unwrap();

        assert_eq!(*handler.queue_depth_during_handle.lock().unwrap(), vec![0, 0]);
    }

    #[tokio::test]
    async fn test_after_batch_keeps_jobs_visible_while_running() {
        let queue = queue_with(&["a", "b"]);
        let mut handler = RecordingHandler::new(AckPolicy::AfterBatch);
        handler.queue = Some(queue.clone());
        let handler = Arc::new(handler);
        let dispatch = DispatchLoop::new(queue.clone(), handler.clone());

        dispatch.tick().await.unwrap();

        assert_eq!(*handler.queue_depth_during_handle.lock().unwrap(), vec![2, 2]);
        assert_eq!(queue.depth().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_ticks_never_process_a_job_twice() {
        let names: Vec<String> = (0..10).map(|i| format!("job-{}", i)).collect();
        let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let queue = queue_with(&name_refs);
        let mut handler = RecordingHandler::new(AckPolicy::AfterBatch);
        handler.delay = Some(Duration::from_millis(5));
        let handler = Arc::new(handler);
        let dispatch = DispatchLoop::new(queue.clone(), handler.clone());

        let (first, second) = tokio::join!(dispatch.tick(), dispatch.tick());
        let outcomes = [first.unwrap(), second.unwrap()];

        assert!(outcomes.contains(&TickOutcome::Skipped));
        let mut seen = handler.seen();
        seen.sort();
        let mut expected = names.clone();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_guard_is_released_after_panicking_job() {
        let queue = queue_with(&["panic"]);
        let dispatch = DispatchLoop::new(
            queue.clone(),
            Arc::new(RecordingHandler::new(AckPolicy::AfterBatch)),
        );

        dispatch.tick().await.unwrap();
        queue
            .submit("email", &JobParams::new().with("name", "a"))
            .unwrap();

        assert_eq!(
            dispatch.tick().await.unwrap(),
            TickOutcome::Processed {
                processed: 1,
                failed: 0
            }
        );
    }
}
