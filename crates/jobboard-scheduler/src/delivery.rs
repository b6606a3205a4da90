//! Delivery of claimed jobs to workers.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use jobboard_core::{
    CapabilityAuthority, Error, JobId, JobScript, JobView, Result, ScriptSource, WorkerRef,
};
use jobboard_db::JobRepo;
use jobboard_store::QueueStore;
use tracing::{debug, info, warn};
use url::Url;

/// Serves job views and deletes finished jobs.
pub struct DeliveryService {
    store: Arc<dyn QueueStore>,
    repo: Arc<dyn JobRepo>,
    authority: Arc<dyn CapabilityAuthority>,
    scripts: Arc<dyn ScriptSource>,
    job_state_url: Url,
    log_parts_url: Url,
}

impl DeliveryService {
    pub fn new(
        store: Arc<dyn QueueStore>,
        repo: Arc<dyn JobRepo>,
        authority: Arc<dyn CapabilityAuthority>,
        scripts: Arc<dyn ScriptSource>,
        job_state_url: Url,
        log_parts_url: Url,
    ) -> Self {
        Self {
            store,
            repo,
            authority,
            scripts,
            job_state_url,
            log_parts_url,
        }
    }

    /// Everything `requester` needs to run `job_id`, including a capability
    /// token that authorizes later calls for this job only.
    pub async fn fetch(&self, job_id: &JobId, requester: &WorkerRef) -> Result<JobView> {
        let record = self.repo.get(job_id).await?;

        let held = self.store.worker_holds(requester, job_id).await?;
        if !held {
            warn!(worker = %requester, job_id = %job_id, "Fetching a job the worker has not claimed");
        }

        let script = self.scripts.script(&record)?;
        let view = JobView {
            job_id: record.job_id.clone(),
            job_script: JobScript {
                name: "main".to_string(),
                encoding: "base64".to_string(),
                content: STANDARD.encode(script),
            },
            job_state_url: job_url(&self.job_state_url, job_id, "state")?,
            log_parts_url: job_url(&self.log_parts_url, job_id, "log_parts")?,
            capability_token: self.authority.mint(job_id)?,
        };

        debug!(worker = %requester, job_id = %job_id, "Delivered job");
        Ok(view)
    }

    /// Remove a finished job: its record and, if still claimed, its claim.
    pub async fn delete(&self, job_id: &JobId, capability: &str) -> Result<()> {
        self.authority.verify(job_id, capability)?;
        let record = self.repo.get(job_id).await?;

        // Record first: a claim left behind without a record is released by
        // the next allocation or dropped as an orphan once reclaimed.
        self.repo.delete(job_id).await?;
        let holder = self
            .store
            .release_claim(&record.site, &record.queue, job_id)
            .await?;

        info!(
            site = %record.site,
            queue = %record.queue,
            job_id = %job_id,
            holder = holder.as_deref().unwrap_or("-"),
            "Deleted job"
        );
        Ok(())
    }
}

fn job_url(base: &Url, job_id: &JobId, leaf: &str) -> Result<String> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| Error::Internal(format!("{} cannot be a base URL", base)))?;
        segments.pop_if_empty().push(job_id.as_str()).push(leaf);
    }
    Ok(url.into())
}
