//! CLI command implementations.

pub mod jobs;
pub mod reconcile;
pub mod stats;
pub mod workers;

use anyhow::{Context, Result};
use jobboard_config::JobBoardConfig;
use jobboard_core::Site;
use jobboard_store::RedisQueueStore;

pub fn resolve_site(config: &JobBoardConfig, site: Option<String>) -> Result<Site> {
    match site {
        Some(site) => Site::new(site).context("Invalid --site"),
        None => Ok(config.default_site.clone()),
    }
}

pub async fn connect_store(config: &JobBoardConfig) -> Result<RedisQueueStore> {
    RedisQueueStore::connect(&config.redis_url, config.store_timeout)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", config.redis_url))
}
