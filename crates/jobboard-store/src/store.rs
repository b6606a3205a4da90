//! Queue store and liveness registry traits.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobboard_core::{JobId, QueueName, Site, WorkerRef};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{StoreError, StoreResult, keys};

/// Queue depth snapshot taken in a single transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepth {
    pub queued: u64,
    pub claimed: u64,
}

/// One entry of a queue's claims mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub job_id: JobId,
    /// Worker holding the claim, in the queue's site.
    pub worker: WorkerRef,
    pub claimed_at: Option<DateTime<Utc>>,
}

/// Primitive queue and claim operations over the shared store.
///
/// A claim lives in four places: the queue's claims mapping, the queue's
/// claim-timestamp mapping, the worker's job list and the worker's job
/// index. Every operation that creates or removes a claim updates all four
/// in one transaction. A job id is never in a queue's list and its claims
/// mapping at the same time.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Register `site` and `queue` and append `job_id` to the queue tail.
    async fn enqueue(&self, site: &Site, queue: &QueueName, job_id: &JobId) -> StoreResult<()>;

    /// Remove and return up to `count` ids from the queue head, in order.
    async fn dequeue_front(
        &self,
        site: &Site,
        queue: &QueueName,
        count: usize,
    ) -> StoreResult<Vec<JobId>>;

    /// Move up to `count` ids from the queue head into claims held by
    /// `worker`, in one transaction. No id is ever returned to two callers.
    async fn claim_front(
        &self,
        worker: &WorkerRef,
        queue: &QueueName,
        count: usize,
        claimed_at: DateTime<Utc>,
    ) -> StoreResult<Vec<JobId>>;

    /// Record a claim of `job_id` by `worker` in all four claim structures.
    async fn record_claim(
        &self,
        worker: &WorkerRef,
        queue: &QueueName,
        job_id: &JobId,
        claimed_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Drop the claim on `job_id`, if any, from all four claim structures.
    ///
    /// Returns the id of the worker that held it.
    async fn release_claim(
        &self,
        site: &Site,
        queue: &QueueName,
        job_id: &JobId,
    ) -> StoreResult<Option<String>>;

    /// Put `job_id` back at the queue head.
    async fn push_front(&self, site: &Site, queue: &QueueName, job_id: &JobId) -> StoreResult<()>;

    /// Release `worker`'s claim on `job_id` and push the id to the queue head.
    ///
    /// Does nothing and returns `false` unless the claim still points at
    /// `worker`, so concurrent sweeps never requeue a job twice.
    async fn reclaim(
        &self,
        worker: &WorkerRef,
        queue: &QueueName,
        job_id: &JobId,
    ) -> StoreResult<bool>;

    /// Queued length and claimed count as one snapshot.
    async fn measure(&self, site: &Site, queue: &QueueName) -> StoreResult<QueueDepth>;

    /// Queued ids from head to tail.
    async fn queued(&self, site: &Site, queue: &QueueName) -> StoreResult<Vec<JobId>>;

    /// Current claims mapping of a queue.
    async fn claims(&self, site: &Site, queue: &QueueName) -> StoreResult<Vec<Claim>>;

    async fn sites(&self) -> StoreResult<Vec<Site>>;

    async fn queues(&self, site: &Site) -> StoreResult<Vec<QueueName>>;

    async fn workers(&self, site: &Site) -> StoreResult<Vec<WorkerRef>>;

    /// Make `worker` known to reconciliation in its site.
    async fn register_worker(&self, worker: &WorkerRef) -> StoreResult<()>;

    /// Job ids claimed by `worker`, oldest claim first.
    async fn worker_jobs(&self, worker: &WorkerRef) -> StoreResult<Vec<JobId>>;

    /// Whether `job_id` is in `worker`'s job index.
    async fn worker_holds(&self, worker: &WorkerRef, job_id: &JobId) -> StoreResult<bool>;
}

/// Per-worker liveness keys. A worker is alive while its key exists.
#[async_trait]
pub trait LivenessRegistry: Send + Sync {
    /// Set or refresh the liveness key with a time-to-live.
    async fn heartbeat(&self, worker: &WorkerRef, ttl: Duration) -> StoreResult<()>;

    async fn is_alive(&self, worker: &WorkerRef) -> StoreResult<bool>;

    /// Delete the liveness key immediately.
    async fn forget(&self, worker: &WorkerRef) -> StoreResult<()>;
}

pub(crate) fn decode_job_ids(key: &str, raw: Vec<String>) -> StoreResult<Vec<JobId>> {
    raw.into_iter()
        .map(|id| {
            JobId::new(id).map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}

/// Decode set members into typed names, skipping entries that are not
/// valid names instead of failing the whole listing.
pub(crate) fn decode_names<T>(
    key: &str,
    raw: impl IntoIterator<Item = String>,
    parse: impl Fn(String) -> jobboard_core::Result<T>,
) -> Vec<T> {
    let mut names: Vec<T> = Vec::new();
    for member in raw {
        match parse(member) {
            Ok(name) => names.push(name),
            Err(e) => warn!(key = %key, error = %e, "Skipping invalid set member"),
        }
    }
    names
}

pub(crate) fn decode_timestamp(key: &str, raw: &str) -> StoreResult<DateTime<Utc>> {
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| StoreError::Corrupt {
            key: key.to_string(),
            message: format!("bad claim timestamp '{}'", raw),
        })
}

/// Assemble claims from the claims and timestamp mappings, ordered by job id.
pub(crate) fn decode_claims(
    site: &Site,
    queue: &QueueName,
    claimers: HashMap<String, String>,
    timestamps: HashMap<String, String>,
) -> StoreResult<Vec<Claim>> {
    let claims_key = keys::claims(site, queue);
    let ts_key = keys::claim_timestamps(site, queue);

    let mut claims = Vec::with_capacity(claimers.len());
    for (job_id, worker_id) in claimers {
        let claimed_at = match timestamps.get(&job_id) {
            Some(raw) => Some(decode_timestamp(&ts_key, raw)?),
            None => None,
        };
        let corrupt = |e: jobboard_core::Error| StoreError::Corrupt {
            key: claims_key.clone(),
            message: e.to_string(),
        };
        let job_id = JobId::new(job_id).map_err(corrupt)?;
        let worker = WorkerRef::new(site.clone(), worker_id).map_err(corrupt)?;
        claims.push(Claim {
            job_id,
            worker,
            claimed_at,
        });
    }
    claims.sort_by(|a, b| a.job_id.cmp(&b.job_id));
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_claims_binds_workers_to_the_site() {
        let site = Site::new("org").unwrap();
        let queue = QueueName::new("q").unwrap();
        let claimers = HashMap::from([("2".to_string(), "w2".to_string()), ("1".to_string(), "w1".to_string())]);
        let timestamps = HashMap::from([("1".to_string(), "1700000000".to_string())]);

        let claims = decode_claims(&site, &queue, claimers, timestamps).unwrap();
        assert_eq!(claims[0].job_id.as_str(), "1");
        assert_eq!(claims[0].worker, WorkerRef::new(site.clone(), "w1").unwrap());
        assert!(claims[0].claimed_at.is_some());
        assert_eq!(claims[1].worker.site(), &site);
        assert!(claims[1].claimed_at.is_none());
    }

    #[test]
    fn test_decode_claims_rejects_invalid_worker() {
        let site = Site::new("org").unwrap();
        let queue = QueueName::new("q").unwrap();
        let claimers = HashMap::from([("1".to_string(), "bad worker".to_string())]);

        let err = decode_claims(&site, &queue, claimers, HashMap::new()).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
