//! Reconciliation sweep: return jobs held by dead workers to their queues.
//!
//! A worker is alive exactly while its liveness key exists. Every claim of a
//! dead worker is reclaimed, pushing the job id back to the head of its queue.
//! A sweep over already reconciled state changes nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use jobboard_core::{JobId, QueueName, Result, Site, WorkerRef};
use jobboard_store::{LivenessRegistry, QueueDepth, QueueStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    /// Claims held after the sweep. Always zero for a dead worker.
    pub claimed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteReport {
    pub reclaimed: u64,
    pub workers: BTreeMap<String, WorkerStats>,
    pub queues: BTreeMap<QueueName, QueueDepth>,
    /// Set when the site's sweep was cut short by a store failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub sites: BTreeMap<Site, SiteReport>,
    /// Wall-clock duration of the sweep in seconds.
    pub elapsed_secs: f64,
}

impl ReconcileReport {
    pub fn reclaimed(&self) -> u64 {
        self.sites.values().map(|s| s.reclaimed).sum()
    }
}

/// Detects dead workers and reclaims their jobs.
pub struct Reconciler {
    store: Arc<dyn QueueStore>,
    liveness: Arc<dyn LivenessRegistry>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn QueueStore>, liveness: Arc<dyn LivenessRegistry>) -> Self {
        Self { store, liveness }
    }

    /// Sweep every known site.
    ///
    /// A store failure inside a site ends that site's sweep and is recorded
    /// in its report; the remaining sites are still swept. Only a failure to
    /// list the sites fails the whole sweep.
    pub async fn sweep(&self) -> Result<ReconcileReport> {
        info!("Starting reconciliation");
        let started = Instant::now();
        let mut report = ReconcileReport::default();

        for site in self.store.sites().await? {
            debug!(site = %site, "Reconciling site");
            let mut site_report = SiteReport::default();
            match self.sweep_site(&site, &mut site_report).await {
                Ok(()) => info!(site = %site, n = site_report.reclaimed, "Reclaimed jobs"),
                Err(e) => {
                    warn!(site = %site, error = %e, n = site_report.reclaimed, "Aborted site reconciliation");
                    site_report.error = Some(e.to_string());
                }
            }
            report.sites.insert(site, site_report);
        }

        report.elapsed_secs = started.elapsed().as_secs_f64();
        info!(
            sites = report.sites.len(),
            reclaimed = report.reclaimed(),
            elapsed_secs = report.elapsed_secs,
            "Finished reconciliation"
        );
        Ok(report)
    }

    /// Fills `report` as it goes, so an aborted site still reports what
    /// was reclaimed before the failure.
    async fn sweep_site(&self, site: &Site, report: &mut SiteReport) -> Result<()> {
        let queues = self.store.queues(site).await?;

        for worker in self.store.workers(site).await? {
            let claimed = if self.liveness.is_alive(&worker).await? {
                self.store.worker_jobs(&worker).await?.len() as u64
            } else {
                self.reclaim_worker(&worker, &queues, &mut report.reclaimed)
                    .await?;
                0
            };
            report
                .workers
                .insert(worker.id().to_string(), WorkerStats { claimed });
        }

        for queue in queues {
            let depth = self.store.measure(site, &queue).await?;
            report.queues.insert(queue, depth);
        }

        Ok(())
    }

    /// Reclaim every claim `worker` holds in `queues`, adding each
    /// reclaimed job to `total`.
    async fn reclaim_worker(
        &self,
        worker: &WorkerRef,
        queues: &[QueueName],
        total: &mut u64,
    ) -> Result<()> {
        let held = self.store.worker_jobs(worker).await?;
        let position: HashMap<&JobId, usize> =
            held.iter().enumerate().map(|(i, id)| (id, i)).collect();

        let mut reclaimed = 0;
        for queue in queues {
            let mut mine: Vec<JobId> = self
                .store
                .claims(worker.site(), queue)
                .await?
                .into_iter()
                .filter(|claim| &claim.worker == worker)
                .map(|claim| claim.job_id)
                .collect();

            // Newest claim first: each push lands at the head, so the
            // oldest claim ends up first in the queue. Ids missing from the
            // worker's list are pushed first and end up behind the rest.
            mine.sort_by_key(|id| {
                std::cmp::Reverse(position.get(id).copied().unwrap_or(usize::MAX))
            });

            for job_id in mine {
                if self.store.reclaim(worker, queue, &job_id).await? {
                    debug!(worker = %worker, queue = %queue, job_id = %job_id, "Reclaimed job");
                    reclaimed += 1;
                    *total += 1;
                }
            }
        }

        if reclaimed > 0 {
            info!(worker = %worker, n = reclaimed, "Reclaimed jobs from dead worker");
        }
        Ok(())
    }
}
