//! Allocation of queued jobs to workers.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use jobboard_core::{AllocatedJob, JobId, QueueName, Result, WorkerRef};
use jobboard_db::JobRepo;
use jobboard_store::QueueStore;
use serde::Serialize;
use tracing::{debug, info, warn};

/// A worker asking for more work.
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub worker: WorkerRef,
    pub queue: QueueName,
    /// Total number of jobs the worker wants to be running.
    pub count: usize,
    /// Jobs the worker says it is still processing.
    pub held: Vec<JobId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub queue: QueueName,
    /// Newly claimed jobs, in queue order.
    pub jobs: Vec<AllocatedJob>,
    /// Held jobs whose record no longer exists. Their claims are released.
    pub unavailable: Vec<JobId>,
}

/// Hands queued jobs to workers.
pub struct Allocator {
    store: Arc<dyn QueueStore>,
    repo: Arc<dyn JobRepo>,
}

impl Allocator {
    pub fn new(store: Arc<dyn QueueStore>, repo: Arc<dyn JobRepo>) -> Self {
        Self { store, repo }
    }

    /// Top the worker up to `count` jobs.
    ///
    /// Held ids without a record are reported as unavailable and do not count
    /// towards `count`. An empty or unknown queue yields an empty allocation.
    pub async fn allocate(&self, request: AllocationRequest) -> Result<Allocation> {
        let AllocationRequest {
            worker,
            queue,
            count,
            held,
        } = request;

        let held: Vec<JobId> = held.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let unavailable = self.check_held(&worker, &queue, &held).await?;
        let valid = held.len() - unavailable.len();
        let need = count.saturating_sub(valid);

        // Registered before claiming so no claim exists for a worker the
        // reconciler cannot see.
        self.store.register_worker(&worker).await?;

        let mut jobs = Vec::new();
        if need > 0 {
            let claimed = self
                .store
                .claim_front(&worker, &queue, need, Utc::now())
                .await?;
            jobs = self.load_claimed(&worker, &queue, claimed).await?;
        }

        info!(
            worker = %worker,
            queue = %queue,
            requested = count,
            held = valid,
            allocated = jobs.len(),
            unavailable = unavailable.len(),
            "Allocated jobs"
        );

        Ok(Allocation {
            queue,
            jobs,
            unavailable,
        })
    }

    /// Find held ids whose record is gone and release their claims.
    async fn check_held(
        &self,
        worker: &WorkerRef,
        queue: &QueueName,
        held: &[JobId],
    ) -> Result<Vec<JobId>> {
        if held.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.repo.find_many(held).await?;
        let missing: Vec<JobId> = held
            .iter()
            .filter(|id| !records.contains_key(*id))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(missing);
        }

        // The record held the queue name, so look in the requested queue
        // first and then in the rest of the site.
        let mut queues = vec![queue.clone()];
        queues.extend(
            self.store
                .queues(worker.site())
                .await?
                .into_iter()
                .filter(|q| q != queue),
        );

        for job_id in &missing {
            for q in &queues {
                if let Some(holder) = self.store.release_claim(worker.site(), q, job_id).await? {
                    debug!(job_id = %job_id, queue = %q, holder = %holder, "Released claim on unavailable job");
                    break;
                }
            }
            warn!(worker = %worker, job_id = %job_id, "Held job is no longer available");
        }

        Ok(missing)
    }

    /// Attach payloads to freshly claimed ids, dropping orphans.
    async fn load_claimed(
        &self,
        worker: &WorkerRef,
        queue: &QueueName,
        claimed: Vec<JobId>,
    ) -> Result<Vec<AllocatedJob>> {
        if claimed.is_empty() {
            return Ok(Vec::new());
        }

        let mut records = match self.repo.find_many(&claimed).await {
            Ok(records) => records,
            Err(e) => {
                self.return_claimed(worker, queue, &claimed).await;
                return Err(e.into());
            }
        };

        let mut jobs = Vec::with_capacity(claimed.len());
        let mut orphans = Vec::new();
        for job_id in &claimed {
            match records.remove(job_id) {
                Some(record) => jobs.push(record.into()),
                None => orphans.push(job_id),
            }
        }

        for job_id in orphans {
            warn!(worker = %worker, queue = %queue, job_id = %job_id, "Dropping queued job with no record");
            if let Err(e) = self.store.release_claim(worker.site(), queue, job_id).await {
                self.return_claimed(worker, queue, &claimed).await;
                return Err(e.into());
            }
        }
        Ok(jobs)
    }

    /// Put claimed ids back at the queue head in their original order.
    /// Ids whose claim was already released stay where they are.
    async fn return_claimed(&self, worker: &WorkerRef, queue: &QueueName, claimed: &[JobId]) {
        for job_id in claimed.iter().rev() {
            if let Err(e) = self.store.reclaim(worker, queue, job_id).await {
                warn!(worker = %worker, job_id = %job_id, error = %e, "Failed to return claimed job");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobboard_core::Site;
    use jobboard_db::MemoryJobRepo;
    use jobboard_store::MemoryQueueStore;
    use serde_json::json;

    struct Fixture {
        allocator: Allocator,
        store: Arc<MemoryQueueStore>,
        repo: Arc<MemoryJobRepo>,
        site: Site,
        queue: QueueName,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryQueueStore::new());
            let repo = Arc::new(MemoryJobRepo::new());
            Self {
                allocator: Allocator::new(store.clone(), repo.clone()),
                store,
                repo,
                site: Site::new("test").unwrap(),
                queue: QueueName::new("lel").unwrap(),
            }
        }

        async fn add(&self, id: &str) -> JobId {
            let job_id = JobId::new(id).unwrap();
            self.repo
                .create(&self.site, &self.queue, &job_id, &json!({"id": id}))
                .await
                .unwrap();
            self.store
                .enqueue(&self.site, &self.queue, &job_id)
                .await
                .unwrap();
            job_id
        }

        fn worker(&self, id: &str) -> WorkerRef {
            WorkerRef::new(self.site.clone(), id).unwrap()
        }

        fn request(&self, worker: &str, count: usize, held: Vec<JobId>) -> AllocationRequest {
            AllocationRequest {
                worker: self.worker(worker),
                queue: self.queue.clone(),
                count,
                held,
            }
        }
    }

    fn ids(allocation: &Allocation) -> Vec<&str> {
        allocation.jobs.iter().map(|j| j.job_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_allocates_in_fifo_order_with_payloads() {
        let fx = Fixture::new();
        for id in ["1", "2", "3"] {
            fx.add(id).await;
        }

        let allocation = fx.allocator.allocate(fx.request("w1", 2, vec![])).await.unwrap();
        assert_eq!(ids(&allocation), vec!["1", "2"]);
        assert_eq!(allocation.jobs[0].payload, json!({"id": "1"}));
        assert!(allocation.unavailable.is_empty());
        assert_eq!(allocation.queue, fx.queue);
    }

    #[tokio::test]
    async fn test_empty_queue_is_not_an_error() {
        let fx = Fixture::new();
        let allocation = fx.allocator.allocate(fx.request("w1", 5, vec![])).await.unwrap();
        assert!(allocation.jobs.is_empty());
        // The worker is still registered for reconciliation.
        assert_eq!(fx.store.workers(&fx.site).await.unwrap(), vec![fx.worker("w1")]);
    }

    #[tokio::test]
    async fn test_held_jobs_count_towards_request() {
        let fx = Fixture::new();
        for id in ["1", "2", "3"] {
            fx.add(id).await;
        }
        let first = fx.allocator.allocate(fx.request("w1", 2, vec![])).await.unwrap();
        let held: Vec<JobId> = first.jobs.into_iter().map(|j| j.job_id).collect();

        let second = fx.allocator.allocate(fx.request("w1", 3, held)).await.unwrap();
        assert_eq!(ids(&second), vec!["3"]);

        let none = fx
            .allocator
            .allocate(fx.request("w1", 1, vec![JobId::new("3").unwrap()]))
            .await
            .unwrap();
        assert!(none.jobs.is_empty());
    }

    #[tokio::test]
    async fn test_zero_count_claims_nothing() {
        let fx = Fixture::new();
        fx.add("1").await;
        let allocation = fx.allocator.allocate(fx.request("w1", 0, vec![])).await.unwrap();
        assert!(allocation.jobs.is_empty());
        assert_eq!(fx.store.queued(&fx.site, &fx.queue).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deleted_held_job_is_unavailable_and_released() {
        let fx = Fixture::new();
        let x = fx.add("x").await;
        fx.add("y").await;
        fx.allocator.allocate(fx.request("w1", 1, vec![])).await.unwrap();
        fx.repo.delete(&x).await.unwrap();

        let allocation = fx
            .allocator
            .allocate(fx.request("w1", 1, vec![x.clone()]))
            .await
            .unwrap();
        assert_eq!(allocation.unavailable, vec![x.clone()]);
        // The stale id no longer counts, so a replacement is handed out.
        assert_eq!(ids(&allocation), vec!["y"]);

        let worker = fx.worker("w1");
        assert!(!fx.store.worker_holds(&worker, &x).await.unwrap());
        let claims = fx.store.claims(&fx.site, &fx.queue).await.unwrap();
        assert!(claims.iter().all(|c| c.job_id != x));
    }

    #[tokio::test]
    async fn test_orphaned_queue_entries_are_dropped() {
        let fx = Fixture::new();
        let orphan = JobId::new("orphan").unwrap();
        fx.store.enqueue(&fx.site, &fx.queue, &orphan).await.unwrap();
        fx.add("1").await;

        let allocation = fx.allocator.allocate(fx.request("w1", 2, vec![])).await.unwrap();
        assert_eq!(ids(&allocation), vec!["1"]);
        assert!(!fx.store.worker_holds(&fx.worker("w1"), &orphan).await.unwrap());
        assert_eq!(fx.store.measure(&fx.site, &fx.queue).await.unwrap().claimed, 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_retryable() {
        let fx = Fixture::new();
        fx.store.set_unavailable(true);
        let err = fx.allocator.allocate(fx.request("w1", 1, vec![])).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
