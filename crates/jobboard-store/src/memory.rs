//! In-memory queue store.
//!
//! Mirrors the Redis data structures key for key behind one mutex, so every
//! trait operation is a single isolated transaction. Liveness keys expire on
//! the tokio clock, which lets tests drive TTLs with `tokio::time::pause`.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobboard_core::{JobId, QueueName, Site, WorkerRef};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::store::{decode_claims, decode_job_ids, decode_names};
use crate::{Claim, LivenessRegistry, QueueDepth, QueueStore, StoreError, StoreResult, keys};

#[derive(Debug, Default)]
struct State {
    sets: HashMap<String, BTreeSet<String>>,
    lists: HashMap<String, VecDeque<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    expiring: HashMap<String, Instant>,
}

// Empty collections are removed, matching Redis semantics.
impl State {
    fn sadd(&mut self, key: &str, member: &str) {
        self.sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
    }

    fn srem(&mut self, key: &str, member: &str) {
        if let Some(set) = self.sets.get_mut(key) {
            set.remove(member);
            if set.is_empty() {
                self.sets.remove(key);
            }
        }
    }

    fn smembers(&self, key: &str) -> Vec<String> {
        self.sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn sismember(&self, key: &str, member: &str) -> bool {
        self.sets.get(key).is_some_and(|s| s.contains(member))
    }

    fn rpush(&mut self, key: &str, value: &str) {
        self.lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
    }

    fn lpush(&mut self, key: &str, value: &str) {
        self.lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
    }

    fn lpop(&mut self, key: &str, count: usize) -> Vec<String> {
        let Some(list) = self.lists.get_mut(key) else {
            return Vec::new();
        };
        let n = count.min(list.len());
        let popped: Vec<String> = list.drain(..n).collect();
        if list.is_empty() {
            self.lists.remove(key);
        }
        popped
    }

    /// Remove the first occurrence of `value`.
    fn lrem_one(&mut self, key: &str, value: &str) {
        if let Some(list) = self.lists.get_mut(key) {
            if let Some(pos) = list.iter().position(|v| v == value) {
                list.remove(pos);
            }
            if list.is_empty() {
                self.lists.remove(key);
            }
        }
    }

    fn lrange(&self, key: &str) -> Vec<String> {
        self.lists
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn llen(&self, key: &str) -> usize {
        self.lists.get(key).map_or(0, |l| l.len())
    }

    fn hset(&mut self, key: &str, field: &str, value: &str) {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    fn hget(&self, key: &str, field: &str) -> Option<&String> {
        self.hashes.get(key).and_then(|h| h.get(field))
    }

    fn hdel(&mut self, key: &str, field: &str) {
        if let Some(hash) = self.hashes.get_mut(key) {
            hash.remove(field);
            if hash.is_empty() {
                self.hashes.remove(key);
            }
        }
    }

    fn hgetall(&self, key: &str) -> HashMap<String, String> {
        self.hashes.get(key).cloned().unwrap_or_default()
    }

    fn hlen(&self, key: &str) -> usize {
        self.hashes.get(key).map_or(0, |h| h.len())
    }

    fn claim(&mut self, worker: &WorkerRef, queue: &QueueName, job_id: &str, ts: &str) {
        let site = worker.site();
        self.hset(&keys::claims(site, queue), job_id, worker.id());
        self.hset(&keys::claim_timestamps(site, queue), job_id, ts);
        self.rpush(&keys::worker_jobs(worker), job_id);
        self.sadd(&keys::worker_index(worker), job_id);
    }

    fn unclaim(&mut self, worker: &WorkerRef, queue: &QueueName, job_id: &str) {
        let site = worker.site();
        self.hdel(&keys::claims(site, queue), job_id);
        self.hdel(&keys::claim_timestamps(site, queue), job_id);
        self.lrem_one(&keys::worker_jobs(worker), job_id);
        self.srem(&keys::worker_index(worker), job_id);
    }
}

/// Queue store and liveness registry held in process memory.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`]
    /// until switched back, simulating a lost store connection.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    async fn state(&self) -> StoreResult<tokio::sync::MutexGuard<'_, State>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(self.state.lock().await)
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enqueue(&self, site: &Site, queue: &QueueName, job_id: &JobId) -> StoreResult<()> {
        let mut state = self.state().await?;
        state.sadd(keys::SITES, site.as_str());
        state.sadd(&keys::queues(site), queue.as_str());
        state.rpush(&keys::queue(site, queue), job_id.as_str());
        Ok(())
    }

    async fn dequeue_front(
        &self,
        site: &Site,
        queue: &QueueName,
        count: usize,
    ) -> StoreResult<Vec<JobId>> {
        let key = keys::queue(site, queue);
        let popped = self.state().await?.lpop(&key, count);
        decode_job_ids(&key, popped)
    }

    async fn claim_front(
        &self,
        worker: &WorkerRef,
        queue: &QueueName,
        count: usize,
        claimed_at: DateTime<Utc>,
    ) -> StoreResult<Vec<JobId>> {
        let key = keys::queue(worker.site(), queue);
        let ts = claimed_at.timestamp().to_string();
        let mut state = self.state().await?;
        let popped = state.lpop(&key, count);
        for job_id in &popped {
            state.claim(worker, queue, job_id, &ts);
        }
        decode_job_ids(&key, popped)
    }

    async fn record_claim(
        &self,
        worker: &WorkerRef,
        queue: &QueueName,
        job_id: &JobId,
        claimed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let ts = claimed_at.timestamp().to_string();
        self.state()
            .await?
            .claim(worker, queue, job_id.as_str(), &ts);
        Ok(())
    }

    async fn release_claim(
        &self,
        site: &Site,
        queue: &QueueName,
        job_id: &JobId,
    ) -> StoreResult<Option<String>> {
        let mut state = self.state().await?;
        let Some(worker_id) = state.hget(&keys::claims(site, queue), job_id.as_str()).cloned()
        else {
            return Ok(None);
        };
        let worker = WorkerRef::new(site.clone(), worker_id.clone()).map_err(|e| {
            StoreError::Corrupt {
                key: keys::claims(site, queue),
                message: e.to_string(),
            }
        })?;
        state.unclaim(&worker, queue, job_id.as_str());
        Ok(Some(worker_id))
    }

    async fn push_front(&self, site: &Site, queue: &QueueName, job_id: &JobId) -> StoreResult<()> {
        self.state()
            .await?
            .lpush(&keys::queue(site, queue), job_id.as_str());
        Ok(())
    }

    async fn reclaim(
        &self,
        worker: &WorkerRef,
        queue: &QueueName,
        job_id: &JobId,
    ) -> StoreResult<bool> {
        let site = worker.site();
        let mut state = self.state().await?;
        let holder = state.hget(&keys::claims(site, queue), job_id.as_str());
        if holder.map(String::as_str) != Some(worker.id()) {
            return Ok(false);
        }
        state.unclaim(worker, queue, job_id.as_str());
        state.lpush(&keys::queue(site, queue), job_id.as_str());
        Ok(true)
    }

    async fn measure(&self, site: &Site, queue: &QueueName) -> StoreResult<QueueDepth> {
        let state = self.state().await?;
        Ok(QueueDepth {
            queued: state.llen(&keys::queue(site, queue)) as u64,
            claimed: state.hlen(&keys::claims(site, queue)) as u64,
        })
    }

    async fn queued(&self, site: &Site, queue: &QueueName) -> StoreResult<Vec<JobId>> {
        let key = keys::queue(site, queue);
        let ids = self.state().await?.lrange(&key);
        decode_job_ids(&key, ids)
    }

    async fn claims(&self, site: &Site, queue: &QueueName) -> StoreResult<Vec<Claim>> {
        let (claimers, timestamps) = {
            let state = self.state().await?;
            (
                state.hgetall(&keys::claims(site, queue)),
                state.hgetall(&keys::claim_timestamps(site, queue)),
            )
        };
        decode_claims(site, queue, claimers, timestamps)
    }

    async fn sites(&self) -> StoreResult<Vec<Site>> {
        let members = self.state().await?.smembers(keys::SITES);
        Ok(decode_names(keys::SITES, members, Site::new))
    }

    async fn queues(&self, site: &Site) -> StoreResult<Vec<QueueName>> {
        let key = keys::queues(site);
        let members = self.state().await?.smembers(&key);
        Ok(decode_names(&key, members, QueueName::new))
    }

    async fn workers(&self, site: &Site) -> StoreResult<Vec<WorkerRef>> {
        let key = keys::workers(site);
        let members = self.state().await?.smembers(&key);
        Ok(decode_names(&key, members, |id| {
            WorkerRef::new(site.clone(), id)
        }))
    }

    async fn register_worker(&self, worker: &WorkerRef) -> StoreResult<()> {
        self.state()
            .await?
            .sadd(&keys::workers(worker.site()), worker.id());
        Ok(())
    }

    async fn worker_jobs(&self, worker: &WorkerRef) -> StoreResult<Vec<JobId>> {
        let key = keys::worker_jobs(worker);
        let ids = self.state().await?.lrange(&key);
        decode_job_ids(&key, ids)
    }

    async fn worker_holds(&self, worker: &WorkerRef, job_id: &JobId) -> StoreResult<bool> {
        Ok(self
            .state()
            .await?
            .sismember(&keys::worker_index(worker), job_id.as_str()))
    }
}

#[async_trait]
impl LivenessRegistry for MemoryQueueStore {
    async fn heartbeat(&self, worker: &WorkerRef, ttl: Duration) -> StoreResult<()> {
        self.state()
            .await?
            .expiring
            .insert(keys::worker_alive(worker), Instant::now() + ttl);
        Ok(())
    }

    async fn is_alive(&self, worker: &WorkerRef) -> StoreResult<bool> {
        let key = keys::worker_alive(worker);
        let mut state = self.state().await?;
        match state.expiring.get(&key) {
            Some(expires) if *expires > Instant::now() => Ok(true),
            Some(_) => {
                state.expiring.remove(&key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn forget(&self, worker: &WorkerRef) -> StoreResult<()> {
        self.state()
            .await?
            .expiring
            .remove(&keys::worker_alive(worker));
        Ok(())
    }
}
