//! Job commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use jobboard_config::JobBoardConfig;
use jobboard_core::{HintQueueAssigner, NewJob, Site};
use jobboard_db::{PgJobRepo, create_pool, run_migrations};
use jobboard_scheduler::JobCreator;
use tracing::debug;

use super::connect_store;

/// Create a job the way a producer would.
pub async fn enqueue(
    config: &JobBoardConfig,
    site: &Site,
    id: String,
    queue: Option<String>,
    payload: &str,
) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("Payload must be valid JSON")?;

    let store = Arc::new(connect_store(config).await?);
    let pool = create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool).await?;
    debug!("Database connected");
    let repo = Arc::new(PgJobRepo::new(pool));

    let creator = JobCreator::new(
        store,
        repo,
        Arc::new(HintQueueAssigner::new(config.default_queue.clone())),
    );
    let record = creator
        .create(
            site,
            NewJob {
                id,
                queue_hint: queue,
                payload,
            },
        )
        .await?;

    println!(
        "Enqueued job {} on {}/{}",
        record.job_id, record.site, record.queue
    );
    Ok(())
}
