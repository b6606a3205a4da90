//! Worker liveness commands.

use std::time::Duration;

use anyhow::Result;
use jobboard_config::JobBoardConfig;
use jobboard_core::{Site, WorkerRef};
use jobboard_store::LivenessRegistry;

use super::connect_store;

pub async fn heartbeat(
    config: &JobBoardConfig,
    site: &Site,
    worker: &str,
    ttl: Option<u64>,
) -> Result<()> {
    let worker = WorkerRef::new(site.clone(), worker)?;
    let ttl = ttl.map(Duration::from_secs).unwrap_or(config.worker_ttl);
    if ttl.is_zero() {
        anyhow::bail!("--ttl must be positive");
    }

    let store = connect_store(config).await?;
    store.heartbeat(&worker, ttl).await?;
    println!("Worker {} alive for {}s", worker, ttl.as_secs());
    Ok(())
}

pub async fn forget(config: &JobBoardConfig, site: &Site, worker: &str) -> Result<()> {
    let worker = WorkerRef::new(site.clone(), worker)?;
    let store = connect_store(config).await?;
    store.forget(&worker).await?;
    println!("Worker {} marked dead", worker);
    Ok(())
}
