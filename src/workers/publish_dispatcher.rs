use super::publish_pool::PublishPool;
use crate::dispatch::{JobError, JobHandler};
use crate::queue::DurableQueue;
use crate::server::metrics;
use anyhow::Result;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishTick {
    /// Jobs taken off the queue and started this tick.
    pub started: usize,
    /// Jobs left on the queue because the pool was full.
    pub deferred: usize,
}

/// Concurrent consumer for the publish queue.
///
/// A tick takes jobs off the queue only while the pool has free slots and
/// runs each one as its own task; the rest wait for a later tick. Snapshot
/// and claim happen under one lock so two ticks never start the same job.
pub struct PublishDispatcher {
    queue: Arc<dyn DurableQueue>,
    handler: Arc<dyn JobHandler>,
    pool: PublishPool,
    claim_lock: Mutex<()>,
}

impl PublishDispatcher {
    pub fn new(queue: Arc<dyn DurableQueue>, handler: Arc<dyn JobHandler>, pool: PublishPool) -> Self {
        Self {
            queue,
            handler,
            pool,
            claim_lock: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &PublishPool {
        &self.pool
    }

    pub async fn tick(&self) -> Result<PublishTick> {
        let category = self.queue.category().as_str();
        let _claim = self.claim_lock.lock().await;

        let jobs = self.queue.snapshot()?;
        if jobs.is_empty() {
            metrics::record_dispatch_tick(category, "idle");
            return Ok(PublishTick {
                started: 0,
                deferred: 0,
            });
        }

        let mut started = 0;
        let mut deferred = 0;
        for (index, job) in jobs.iter().enumerate() {
            let Some(slot) = self.pool.try_reserve() else {
                deferred = jobs.len() - index;
                break;
            };
            if !self.queue.claim(&job.id)? {
                debug!("Publish job {} already claimed", job.id);
                continue;
            }
            started += 1;

            let handler = self.handler.clone();
            let job = job.clone();
            tokio::spawn(async move {
                let _slot = slot;
                let result = match job.params() {
                    Ok(params) => AssertUnwindSafe(handler.handle(&job, params))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            Err(JobError::Panicked("publish handler panicked".to_string()))
                        }),
                    Err(err) => Err(err.into()),
                };
                metrics::record_job_result(category, result.is_ok());
                match result {
                    Ok(()) => info!("Publish job {} ({}) completed", job.id, job.label),
                    Err(err) => error!("Publish job {} ({}) failed: {}", job.id, job.label, err),
                }
            });
        }

        if deferred > 0 {
            debug!(
                "{} publish jobs deferred, {} of {} slots busy",
                deferred,
                self.pool.in_flight(),
                self.pool.max_concurrent()
            );
        }
        if let Ok(depth) = self.queue.depth() {
            metrics::set_queue_depth(category, depth);
        }
        let outcome = if started == 0 && deferred > 0 {
            "skipped"
        } else {
            "processed"
        };
        metrics::record_dispatch_tick(category, outcome);

        Ok(PublishTick { started, deferred })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{InMemoryQueue, JobEnvelope, JobParams, QueueCategory};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct SlowHandler {
        running: AtomicUsize,
        peak: AtomicUsize,
        completed: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for SlowHandler {
        fn category(&self) -> QueueCategory {
            QueueCategory::VideoPublish
        }

        async fn handle(&self, _job: &JobEnvelope, params: JobParams) -> Result<(), JobError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.completed.fetch_add(1, Ordering::SeqCst);
            if params.get("fail").is_some() {
                return Err(JobError::ExecutionFailed("upload rejected".to_string()));
            }
            Ok(())
        }
    }

    fn queue_with(count: usize) -> Arc<InMemoryQueue> {
        let queue = Arc::new(InMemoryQueue::new(QueueCategory::VideoPublish));
        for i in 0..count {
            let mut params = JobParams::new().with("n", i);
            if i % 2 == 0 {
                params.set("fail", "1");
            }
            queue.submit("publish:provider", &params).unwrap();
        }
        queue
    }

    #[tokio::test]
    async fn test_burst_never_exceeds_ceiling() {
        let max = 3;
        let queue = queue_with(max * 3);
        let handler = Arc::new(SlowHandler::default());
        let dispatcher = Arc::new(PublishDispatcher::new(
            queue.clone(),
            handler.clone(),
            PublishPool::new(max),
        ));

        let first = dispatcher.tick().await.unwrap();
        assert_eq!(first.started, max);
        assert_eq!(first.deferred, max * 2);
        assert_eq!(queue.depth().unwrap(), max * 2);

        for _ in 0..200 {
            if handler.completed.load(Ordering::SeqCst) == max * 3 {
                break;
            }
            let (a, b) = tokio::join!(dispatcher.tick(), dispatcher.tick());
            a.unwrap();
            b.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(handler.completed.load(Ordering::SeqCst), max * 3);
        assert!(handler.peak.load(Ordering::SeqCst) <= max);
        assert_eq!(queue.depth().unwrap(), 0);

        for _ in 0..100 {
            if dispatcher.pool().in_flight() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(dispatcher.pool().in_flight(), 0);
    }

    /// Loses the first claim to another consumer that took the job after
    /// the snapshot.
    struct ContendedQueue {
        inner: InMemoryQueue,
        contended: std::sync::atomic::AtomicBool,
    }

    impl DurableQueue for ContendedQueue {
        fn category(&self) -> QueueCategory {
            self.inner.category()
        }

        fn enqueue(&self, jobs: Vec<JobEnvelope>) -> Result<()> {
            self.inner.enqueue(jobs)
        }

        fn snapshot(&self) -> Result<Vec<JobEnvelope>> {
            self.inner.snapshot()
        }

        fn remove(&self, ids: &[String]) -> Result<usize> {
            self.inner.remove(ids)
        }

        fn claim(&self, id: &str) -> Result<bool> {
            if !self.contended.swap(true, Ordering::SeqCst) {
                self.inner.claim(id)?;
            }
            self.inner.claim(id)
        }

        fn depth(&self) -> Result<usize> {
            self.inner.depth()
        }
    }

    #[tokio::test]
    async fn test_jobs_claimed_elsewhere_are_not_deferred() {
        let queue = Arc::new(ContendedQueue {
            inner: InMemoryQueue::new(QueueCategory::VideoPublish),
            contended: std::sync::atomic::AtomicBool::new(false),
        });
        for i in 0..3 {
            queue
                .submit("publish:provider", &JobParams::new().with("n", i))
                .unwrap();
        }
        let dispatcher = PublishDispatcher::new(
            queue.clone(),
            Arc::new(SlowHandler::default()),
            PublishPool::new(1),
        );

        let tick = dispatcher.tick().await.unwrap();

        assert_eq!(tick, PublishTick { started: 1, deferred: 1 });
        assert_eq!(queue.depth().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_full_pool_leaves_jobs_queued() {
        let queue = queue_with(2);
        let pool = PublishPool::new(1);
        let _busy = pool.try_reserve().unwrap();
        let dispatcher = PublishDispatcher::new(queue.clone(), Arc::new(SlowHandler::default()), pool);

        let tick = dispatcher.tick().await.unwrap();

        assert_eq!(tick, PublishTick { started: 0, deferred: 2 });
        assert_eq!(queue.depth().unwrap(), 2);
    }
}
