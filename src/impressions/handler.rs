use super::SqliteImpressionStore;
use crate::dispatch::{required_int, JobError, JobHandler};
use crate::queue::{JobEnvelope, JobParams, QueueCategory};
use async_trait::async_trait;
use tracing::debug;

pub struct ImpressionsJobHandler {
    store: SqliteImpressionStore,
}

impl ImpressionsJobHandler {
    pub fn new(store: SqliteImpressionStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl JobHandler for ImpressionsJobHandler {
    fn category(&self) -> QueueCategory {
        QueueCategory::Impressions
    }

    async fn handle(&self, job: &JobEnvelope, params: JobParams) -> Result<(), JobError> {
        let subject_id = required_int(&params, "subjectId")?;
        let count = match params.get_int("count") {
            count if count > 0 => count,
            _ => 1,
        };

        let store = self.store.clone();
        let total = tokio::task::spawn_blocking(move || store.increment(subject_id, count))
            .await
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?
            .map_err(|e| JobError::ExecutionFailed(format!("{:#}", e)))?;

        debug!(
            "Impressions job {}: subject {} +{} = {}",
            job.id, subject_id, count, total
        );
        Ok(())
    }
}
