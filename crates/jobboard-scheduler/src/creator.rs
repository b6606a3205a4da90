//! Job creation: durable record first, then the queue entry.

use std::sync::Arc;

use jobboard_core::{JobId, JobRecord, NewJob, QueueAssigner, Result, Site};
use jobboard_db::JobRepo;
use jobboard_store::QueueStore;
use tracing::{error, info, warn};

/// Accepts new jobs from producers.
pub struct JobCreator {
    store: Arc<dyn QueueStore>,
    repo: Arc<dyn JobRepo>,
    assigner: Arc<dyn QueueAssigner>,
}

impl JobCreator {
    pub fn new(
        store: Arc<dyn QueueStore>,
        repo: Arc<dyn JobRepo>,
        assigner: Arc<dyn QueueAssigner>,
    ) -> Self {
        Self {
            store,
            repo,
            assigner,
        }
    }

    /// Persist `job` and append it to its assigned queue in `site`.
    ///
    /// The record is written before the enqueue so an allocated id always
    /// has a record behind it. If the enqueue fails the record is removed
    /// again.
    pub async fn create(&self, site: &Site, job: NewJob) -> Result<JobRecord> {
        let job_id = JobId::new(job.id.as_str())?;
        let queue = self.assigner.assign(&job)?;

        let record = self.repo.create(site, &queue, &job_id, &job.payload).await?;

        if let Err(e) = self.store.enqueue(site, &queue, &job_id).await {
            warn!(site = %site, queue = %queue, job_id = %job_id, error = %e, "Enqueue failed, removing record");
            if let Err(cleanup) = self.repo.delete(&job_id).await {
                error!(job_id = %job_id, error = %cleanup, "Failed to remove record of unqueued job");
            }
            return Err(e.into());
        }

        info!(site = %site, queue = %queue, job_id = %job_id, "Created job");
        Ok(record)
    }
}
