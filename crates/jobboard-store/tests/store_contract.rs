//! Transactional contract shared by every queue store implementation.
//!
//! The Redis variants need a live server:
//! `JOBBOARD_TEST_REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored`

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jobboard_core::{JobId, QueueName, Site, WorkerRef};
use jobboard_store::{LivenessRegistry, MemoryQueueStore, QueueStore, RedisQueueStore};

fn unique_site(prefix: &str) -> Site {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    Site::new(format!("{}-{}", prefix, nanos)).unwrap()
}

fn job(id: &str) -> JobId {
    JobId::new(id).unwrap()
}

async fn redis_store() -> RedisQueueStore {
    let url = std::env::var("JOBBOARD_TEST_REDIS_URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    RedisQueueStore::connect(&url, Duration::from_secs(5))
        .await
        .expect("Should connect to redis")
}

async fn claims_move_ids_out_of_the_queue(store: Arc<dyn QueueStore>) {
    let site = unique_site("claims");
    let queue = QueueName::new("q").unwrap();
    let worker = WorkerRef::new(site.clone(), "w1").unwrap();
    for id in ["a", "b", "c"] {
        store.enqueue(&site, &queue, &job(id)).await.unwrap();
    }

    let claimed = store
        .claim_front(&worker, &queue, 2, Utc::now())
        .await
        .unwrap();
    assert_eq!(claimed, vec![job("a"), job("b")]);
    assert_eq!(store.queued(&site, &queue).await.unwrap(), vec![job("c")]);
    assert_eq!(
        store.worker_jobs(&worker).await.unwrap(),
        vec![job("a"), job("b")]
    );
    assert!(store.worker_holds(&worker, &job("a")).await.unwrap());

    let depth = store.measure(&site, &queue).await.unwrap();
    assert_eq!((depth.queued, depth.claimed), (1, 2));

    let claims = store.claims(&site, &queue).await.unwrap();
    assert!(claims.iter().all(|c| c.worker.id() == "w1"));
    assert_eq!(claims.len(), 2);
}

async fn reclaim_returns_job_to_head(store: Arc<dyn QueueStore>) {
    let site = unique_site("reclaim");
    let queue = QueueName::new("q").unwrap();
    let worker = WorkerRef::new(site.clone(), "w1").unwrap();
    for id in ["a", "b"] {
        store.enqueue(&site, &queue, &job(id)).await.unwrap();
    }
    store
        .claim_front(&worker, &queue, 1, Utc::now())
        .await
        .unwrap();

    assert!(store.reclaim(&worker, &queue, &job("a")).await.unwrap());
    assert!(!store.reclaim(&worker, &queue, &job("a")).await.unwrap());
    assert_eq!(
        store.queued(&site, &queue).await.unwrap(),
        vec![job("a"), job("b")]
    );
    assert!(store.worker_jobs(&worker).await.unwrap().is_empty());
    assert!(!store.worker_holds(&worker, &job("a")).await.unwrap());
}

async fn release_clears_every_claim_structure(store: Arc<dyn QueueStore>) {
    let site = unique_site("release");
    let queue = QueueName::new("q").unwrap();
    let worker = WorkerRef::new(site.clone(), "w1").unwrap();
    store.enqueue(&site, &queue, &job("a")).await.unwrap();
    store
        .claim_front(&worker, &queue, 1, Utc::now())
        .await
        .unwrap();

    let holder = store.release_claim(&site, &queue, &job("a")).await.unwrap();
    assert_eq!(holder.as_deref(), Some("w1"));
    assert!(store.claims(&site, &queue).await.unwrap().is_empty());
    assert!(store.worker_jobs(&worker).await.unwrap().is_empty());
    assert!(store.queued(&site, &queue).await.unwrap().is_empty());
}

async fn concurrent_claims_never_share_an_id(store: Arc<dyn QueueStore>) {
    let site = unique_site("race");
    let queue = QueueName::new("q").unwrap();
    let queued: Vec<JobId> = (0..200).map(|n| job(&n.to_string())).collect();
    for id in &queued {
        store.enqueue(&site, &queue, id).await.unwrap();
    }

    let mut handles = Vec::new();
    for n in 0..16 {
        let store = store.clone();
        let worker = WorkerRef::new(site.clone(), format!("w{}", n)).unwrap();
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let mut mine = Vec::new();
            loop {
                let claimed = store
                    .claim_front(&worker, &queue, 3, Utc::now())
                    .await
                    .unwrap();
                if claimed.is_empty() {
                    break;
                }
                mine.extend(claimed);
            }
            mine
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(seen.insert(id.clone()), "job {} claimed twice", id);
        }
    }
    let expected: HashSet<JobId> = queued.into_iter().collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_memory_claims_move_ids_out_of_the_queue() {
    claims_move_ids_out_of_the_queue(Arc::new(MemoryQueueStore::new())).await;
}

#[tokio::test]
async fn test_memory_reclaim_returns_job_to_head() {
    reclaim_returns_job_to_head(Arc::new(MemoryQueueStore::new())).await;
}

#[tokio::test]
async fn test_memory_release_clears_every_claim_structure() {
    release_clears_every_claim_structure(Arc::new(MemoryQueueStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_concurrent_claims_never_share_an_id() {
    concurrent_claims_never_share_an_id(Arc::new(MemoryQueueStore::new())).await;
}

#[tokio::test]
#[ignore]
async fn test_redis_claims_move_ids_out_of_the_queue() {
    claims_move_ids_out_of_the_queue(Arc::new(redis_store().await)).await;
}

#[tokio::test]
#[ignore]
async fn test_redis_reclaim_returns_job_to_head() {
    reclaim_returns_job_to_head(Arc::new(redis_store().await)).await;
}

#[tokio::test]
#[ignore]
async fn test_redis_release_clears_every_claim_structure() {
    release_clears_every_claim_structure(Arc::new(redis_store().await)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_redis_concurrent_claims_never_share_an_id() {
    concurrent_claims_never_share_an_id(Arc::new(redis_store().await)).await;
}

#[tokio::test]
#[ignore]
async fn test_redis_liveness_key_expires() {
    let store = redis_store().await;
    let worker = WorkerRef::new(unique_site("alive"), "w1").unwrap();

    store
        .heartbeat(&worker, Duration::from_millis(300))
        .await
        .unwrap();
    assert!(store.is_alive(&worker).await.unwrap());
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!store.is_alive(&worker).await.unwrap());

    store
        .heartbeat(&worker, Duration::from_secs(30))
        .await
        .unwrap();
    store.forget(&worker).await.unwrap();
    assert!(!store.is_alive(&worker).await.unwrap());
}
