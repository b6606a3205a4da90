//! Queue and worker statistics.

use anyhow::Result;
use jobboard_config::JobBoardConfig;
use jobboard_core::Site;
use jobboard_store::{LivenessRegistry, QueueStore};

use super::connect_store;

/// Print queue depths and per-worker claims for `site` without mutating anything.
pub async fn show(config: &JobBoardConfig, site: &Site) -> Result<()> {
    let store = connect_store(config).await?;

    println!("Site: {}", site);
    println!();
    println!("{:<32} {:>8} {:>8}", "QUEUE", "QUEUED", "CLAIMED");
    for queue in store.queues(site).await? {
        let depth = store.measure(site, &queue).await?;
        println!("{:<32} {:>8} {:>8}", queue, depth.queued, depth.claimed);
    }

    println!();
    println!("{:<32} {:>8} {:>8}", "WORKER", "ALIVE", "CLAIMED");
    for worker in store.workers(site).await? {
        let alive = store.is_alive(&worker).await?;
        let claimed = store.worker_jobs(&worker).await?.len();
        println!(
            "{:<32} {:>8} {:>8}",
            worker.id(),
            if alive { "yes" } else { "no" },
            claimed
        );
    }

    Ok(())
}
