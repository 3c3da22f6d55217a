use super::{JobEnvelope, JobParams, QueueCategory};
use anyhow::Result;
use std::sync::Mutex;

/// A durable, per-category FIFO of job envelopes.
///
/// Implementations must keep a job visible in [`snapshot`](Self::snapshot)
/// until it is removed, and must make [`claim`](Self::claim) succeed for at
/// most one caller per job.
pub trait DurableQueue: Send + Sync {
    fn category(&self) -> QueueCategory;

    /// Persist a batch of jobs. Either every envelope is stored or none is.
    fn enqueue(&self, jobs: Vec<JobEnvelope>) -> Result<()>;

    /// All jobs currently queued, oldest first.
    fn snapshot(&self) -> Result<Vec<JobEnvelope>>;

    /// Remove the given jobs, returning how many were actually present.
    fn remove(&self, ids: &[String]) -> Result<usize>;

    /// Atomically take ownership of one job by removing it.
    fn claim(&self, id: &str) -> Result<bool>;

    fn depth(&self) -> Result<usize>;

    /// Encode `params` and enqueue them under `label`, returning the job id.
    fn submit(&self, label: &str, params: &JobParams) -> Result<String> {
        let job = JobEnvelope::new(label, params)?;
        let id = job.id.clone();
        self.enqueue(vec![job])?;
        Ok(id)
    }
}

/// Process-local queue, used by tests and by callers that don't need
/// persistence.
pub struct InMemoryQueue {
    category: QueueCategory,
    jobs: Mutex<Vec<JobEnvelope>>,
}

impl InMemoryQueue {
    pub fn new(category: QueueCategory) -> Self {
        Self {
            category,
            jobs: Mutex::new(Vec::new()),
        }
    }
}

impl DurableQueue for InMemoryQueue {
    fn category(&self) -> QueueCategory {
        self.category
    }

    fn enqueue(&self, jobs: Vec<JobEnvelope>) -> Result<()> {
        let mut queued = self.jobs.lock().unwrap();
        if jobs
            .iter()
            .any(|job| queued.iter().any(|existing| existing.id == job.id))
        {
            anyhow::bail!("Job id already queued");
        }
        queued.extend(jobs);
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<JobEnvelope>> {
        Ok(self.jobs.lock().unwrap().clone())
    }

    fn remove(&self, ids: &[String]) -> Result<usize> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|job| !ids.contains(&job.id));
        Ok(before - jobs.len())
    }

    fn claim(&self, id: &str) -> Result<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.iter().position(|job| job.id == id) {
            Some(index) => {
                jobs.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn depth(&self) -> Result<usize> {
        Ok(self.jobs.lock().unwrap().len())
    }
}
