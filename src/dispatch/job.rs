use crate::queue::{JobEnvelope, JobParams, ParamsError, QueueCategory};
use async_trait::async_trait;

/// When a dispatch loop acknowledges (removes) the jobs of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Remove the whole snapshot before touching any job. A crash mid-batch
    /// loses the jobs, a concurrent consumer never sees them twice.
    BeforeProcessing,
    /// Remove handled jobs once the batch is over, failed ones included.
    #[default]
    AfterBatch,
}

#[derive(Debug)]
pub enum JobError {
    InvalidParams(String),
    ExecutionFailed(String),
    Panicked(String),
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::InvalidParams(msg) => write!(f, "Invalid parameters: {}", msg),
            JobError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
            JobError::Panicked(msg) => write!(f, "Handler panicked: {}", msg),
        }
    }
}

impl std::error::Error for JobError {}

impl From<ParamsError> for JobError {
    fn from(err: ParamsError) -> Self {
        JobError::InvalidParams(err.to_string())
    }
}

/// The category-specific action a dispatch loop runs for each job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn category(&self) -> QueueCategory;

    fn ack_policy(&self) -> AckPolicy {
        AckPolicy::AfterBatch
    }

    async fn handle(&self, job: &JobEnvelope, params: JobParams) -> Result<(), JobError>;
}

/// Read a required positive integer parameter.
pub fn required_int(params: &JobParams, name: &str) -> Result<i64, JobError> {
    match params.get_int(name) {
        value if value > 0 => Ok(value),
        _ => Err(JobError::InvalidParams(format!("missing {}", name))),
    }
}

/// Read a required non-blank string parameter.
pub fn required_str<'a>(params: &'a JobParams, name: &str) -> Result<&'a str, JobError> {
    params
        .get(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| JobError::InvalidParams(format!("missing {}", name)))
}
