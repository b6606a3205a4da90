//! Redis-backed queue store.
//!
//! Plain multi-key writes run as `MULTI`/`EXEC` pipelines. Transitions that
//! must read a claim before changing it (claim, release, reclaim) run as Lua
//! scripts, which Redis executes atomically. Scripts derive per-worker keys
//! from a prefix argument, so a single-node Redis (or a cluster with all of
//! a site's keys in one slot) is assumed.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobboard_core::{JobId, QueueName, Site, WorkerRef};
use redis::aio::MultiplexedConnection;
use redis::{RedisResult, Script};
use tracing::info;

use crate::store::{decode_claims, decode_job_ids, decode_names};
use crate::{Claim, LivenessRegistry, QueueDepth, QueueStore, StoreError, StoreResult, keys};

// KEYS: queue, claims, timestamps, worker list, worker index
// ARGV: count, worker id, claim time
const CLAIM_FRONT: &str = r#"
local claimed = {}
for i = 1, tonumber(ARGV[1]) do
  local id = redis.call('LPOP', KEYS[1])
  if not id then break end
  redis.call('HSET', KEYS[2], id, ARGV[2])
  redis.call('HSET', KEYS[3], id, ARGV[3])
  redis.call('RPUSH', KEYS[4], id)
  redis.call('SADD', KEYS[5], id)
  claimed[#claimed + 1] = id
end
return claimed
"#;

// KEYS: claims, timestamps
// ARGV: job id, worker key prefix
const RELEASE_CLAIM: &str = r#"
local worker = redis.call('HGET', KEYS[1], ARGV[1])
if not worker then return false end
redis.call('HDEL', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
redis.call('LREM', ARGV[2] .. worker, 1, ARGV[1])
redis.call('SREM', ARGV[2] .. worker .. ':idx', ARGV[1])
return worker
"#;

// KEYS: queue, claims, timestamps, worker list, worker index
// ARGV: job id, worker id
const RECLAIM: &str = r#"
if redis.call('HGET', KEYS[2], ARGV[1]) ~= ARGV[2] then return 0 end
redis.call('SREM', KEYS[5], ARGV[1])
redis.call('LREM', KEYS[4], 1, ARGV[1])
redis.call('LPUSH', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
redis.call('HDEL', KEYS[3], ARGV[1])
return 1
"#;

/// Queue store and liveness registry backed by Redis.
#[derive(Clone)]
pub struct RedisQueueStore {
    conn: MultiplexedConnection,
    timeout: Duration,
    claim_front: Script,
    release_claim: Script,
    reclaim: Script,
}

impl RedisQueueStore {
    /// Wrap an established connection. Each store call is bounded by `timeout`.
    pub fn new(conn: MultiplexedConnection, timeout: Duration) -> Self {
        Self {
            conn,
            timeout,
            claim_front: Script::new(CLAIM_FRONT),
            release_claim: Script::new(RELEASE_CLAIM),
            reclaim: Script::new(RECLAIM),
        }
    }

    /// Connect to the Redis server at `url`.
    pub async fn connect(url: &str, timeout: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| StoreError::Timeout(timeout))??;
        info!("Connected to redis");
        Ok(Self::new(conn, timeout))
    }

    async fn timed<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    async fn members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("SMEMBERS").arg(key).clone();
        let mut members: Vec<String> = self.timed(cmd.query_async(&mut conn)).await?;
        members.sort();
        Ok(members)
    }

    async fn list(&self, key: &str) -> StoreResult<Vec<JobId>> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("LRANGE").arg(key).arg(0).arg(-1).clone();
        let ids: Vec<String> = self.timed(cmd.query_async(&mut conn)).await?;
        decode_job_ids(key, ids)
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn enqueue(&self, site: &Site, queue: &QueueName, job_id: &JobId) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SADD")
            .arg(keys::SITES)
            .arg(site.as_str())
            .ignore()
            .cmd("SADD")
            .arg(keys::queues(site))
            .arg(queue.as_str())
            .ignore()
            .cmd("RPUSH")
            .arg(keys::queue(site, queue))
            .arg(job_id.as_str())
            .ignore();
        let _: () = self.timed(pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn dequeue_front(
        &self,
        site: &Site,
        queue: &QueueName,
        count: usize,
    ) -> StoreResult<Vec<JobId>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let key = keys::queue(site, queue);
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("LPOP").arg(&key).arg(count).clone();
        let popped: Option<Vec<String>> = self.timed(cmd.query_async(&mut conn)).await?;
        decode_job_ids(&key, popped.unwrap_or_default())
    }

    async fn claim_front(
        &self,
        worker: &WorkerRef,
        queue: &QueueName,
        count: usize,
        claimed_at: DateTime<Utc>,
    ) -> StoreResult<Vec<JobId>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let site = worker.site();
        let key = keys::queue(site, queue);
        let mut conn = self.conn.clone();
        let mut invocation = self.claim_front.prepare_invoke();
        invocation
            .key(&key)
            .key(keys::claims(site, queue))
            .key(keys::claim_timestamps(site, queue))
            .key(keys::worker_jobs(worker))
            .key(keys::worker_index(worker))
            .arg(count)
            .arg(worker.id())
            .arg(claimed_at.timestamp());
        let claimed: Vec<String> = self.timed(invocation.invoke_async(&mut conn)).await?;
        decode_job_ids(&key, claimed)
    }

    async fn record_claim(
        &self,
        worker: &WorkerRef,
        queue: &QueueName,
        job_id: &JobId,
        claimed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let site = worker.site();
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("HSET")
            .arg(keys::claims(site, queue))
            .arg(job_id.as_str())
            .arg(worker.id())
            .ignore()
            .cmd("HSET")
            .arg(keys::claim_timestamps(site, queue))
            .arg(job_id.as_str())
            .arg(claimed_at.timestamp())
            .ignore()
            .cmd("RPUSH")
            .arg(keys::worker_jobs(worker))
            .arg(job_id.as_str())
            .ignore()
            .cmd("SADD")
            .arg(keys::worker_index(worker))
            .arg(job_id.as_str())
            .ignore();
        let _: () = self.timed(pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn release_claim(
        &self,
        site: &Site,
        queue: &QueueName,
        job_id: &JobId,
    ) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let mut invocation = self.release_claim.prepare_invoke();
        invocation
            .key(keys::claims(site, queue))
            .key(keys::claim_timestamps(site, queue))
            .arg(job_id.as_str())
            .arg(keys::worker_prefix(site));
        let worker: Option<String> = self.timed(invocation.invoke_async(&mut conn)).await?;
        Ok(worker)
    }

    async fn push_front(&self, site: &Site, queue: &QueueName, job_id: &JobId) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("LPUSH")
            .arg(keys::queue(site, queue))
            .arg(job_id.as_str())
            .clone();
        let _: () = self.timed(cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn reclaim(
        &self,
        worker: &WorkerRef,
        queue: &QueueName,
        job_id: &JobId,
    ) -> StoreResult<bool> {
        let site = worker.site();
        let mut conn = self.conn.clone();
        let mut invocation = self.reclaim.prepare_invoke();
        invocation
            .key(keys::queue(site, queue))
            .key(keys::claims(site, queue))
            .key(keys::claim_timestamps(site, queue))
            .key(keys::worker_jobs(worker))
            .key(keys::worker_index(worker))
            .arg(job_id.as_str())
            .arg(worker.id());
        let reclaimed: i64 = self.timed(invocation.invoke_async(&mut conn)).await?;
        Ok(reclaimed == 1)
    }

    async fn measure(&self, site: &Site, queue: &QueueName) -> StoreResult<QueueDepth> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("LLEN")
            .arg(keys::queue(site, queue))
            .cmd("HLEN")
            .arg(keys::claims(site, queue));
        let (queued, claimed): (u64, u64) = self.timed(pipe.query_async(&mut conn)).await?;
        Ok(QueueDepth { queued, claimed })
    }

    async fn queued(&self, site: &Site, queue: &QueueName) -> StoreResult<Vec<JobId>> {
        self.list(&keys::queue(site, queue)).await
    }

    async fn claims(&self, site: &Site, queue: &QueueName) -> StoreResult<Vec<Claim>> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("HGETALL")
            .arg(keys::claims(site, queue))
            .cmd("HGETALL")
            .arg(keys::claim_timestamps(site, queue));
        let (claimers, timestamps): (HashMap<String, String>, HashMap<String, String>) =
            self.timed(pipe.query_async(&mut conn)).await?;
        decode_claims(site, queue, claimers, timestamps)
    }

    async fn sites(&self) -> StoreResult<Vec<Site>> {
        let members = self.members(keys::SITES).await?;
        Ok(decode_names(keys::SITES, members, Site::new))
    }

    async fn queues(&self, site: &Site) -> StoreResult<Vec<QueueName>> {
        let key = keys::queues(site);
        let members = self.members(&key).await?;
        Ok(decode_names(&key, members, QueueName::new))
    }

    async fn workers(&self, site: &Site) -> StoreResult<Vec<WorkerRef>> {
        let key = keys::workers(site);
        let members = self.members(&key).await?;
        Ok(decode_names(&key, members, |id| {
            WorkerRef::new(site.clone(), id)
        }))
    }

    async fn register_worker(&self, worker: &WorkerRef) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("SADD")
            .arg(keys::workers(worker.site()))
            .arg(worker.id())
            .clone();
        let _: () = self.timed(cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn worker_jobs(&self, worker: &WorkerRef) -> StoreResult<Vec<JobId>> {
        self.list(&keys::worker_jobs(worker)).await
    }

    async fn worker_holds(&self, worker: &WorkerRef, job_id: &JobId) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("SISMEMBER")
            .arg(keys::worker_index(worker))
            .arg(job_id.as_str())
            .clone();
        let held: bool = self.timed(cmd.query_async(&mut conn)).await?;
        Ok(held)
    }
}

#[async_trait]
impl LivenessRegistry for RedisQueueStore {
    async fn heartbeat(&self, worker: &WorkerRef, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("SET")
            .arg(keys::worker_alive(worker))
            .arg(Utc::now().timestamp())
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .clone();
        let _: () = self.timed(cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn is_alive(&self, worker: &WorkerRef) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("EXISTS").arg(keys::worker_alive(worker)).clone();
        let alive: bool = self.timed(cmd.query_async(&mut conn)).await?;
        Ok(alive)
    }

    async fn forget(&self, worker: &WorkerRef) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("DEL").arg(keys::worker_alive(worker)).clone();
        let _: () = self.timed(cmd.query_async(&mut conn)).await?;
        Ok(())
    }
}
