use super::{FallbackPolicy, MailMessage, MailTransport};
use crate::dispatch::{AckPolicy, JobError, JobHandler};
use crate::queue::{JobEnvelope, JobParams, QueueCategory};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct EmailJobHandler {
    transport: Arc<dyn MailTransport>,
    policy: FallbackPolicy,
}

impl EmailJobHandler {
    pub fn new(transport: Arc<dyn MailTransport>, policy: FallbackPolicy) -> Self {
        Self { transport, policy }
    }
}

#[async_trait]
impl JobHandler for EmailJobHandler {
    fn category(&self) -> QueueCategory {
        QueueCategory::Email
    }

    fn ack_policy(&self) -> AckPolicy {
        AckPolicy::AfterBatch
    }

    async fn handle(&self, job: &JobEnvelope, params: JobParams) -> Result<(), JobError> {
        let message = MailMessage::from_params(&params)?;
        let report = self.policy.send(self.transport.as_ref(), &message).await;
        match report.result {
            Ok(endpoint) => {
                info!(
                    "Mail job {} sent to {} via {} after {} attempt(s)",
                    job.id, message.to, endpoint, report.attempts
                );
                Ok(())
            }
            Err(err) => Err(JobError::ExecutionFailed(format!(
                "mail to {} failed after {} attempt(s): {}",
                message.to, report.attempts, err
            ))),
        }
    }
}
