//! Application state.

use std::sync::Arc;

use jobboard_config::JobBoardConfig;
use jobboard_core::{CapabilityAuthority, HintQueueAssigner, PayloadScriptSource, QueueName, Site};
use jobboard_db::JobRepo;
use jobboard_scheduler::{Allocator, DeliveryService, JobCreator, ReconcileReport};
use jobboard_store::QueueStore;
use tokio::sync::watch;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub creator: Arc<JobCreator>,
    pub allocator: Arc<Allocator>,
    pub delivery: Arc<DeliveryService>,
    pub reports: watch::Receiver<Option<Arc<ReconcileReport>>>,
    pub default_site: Site,
    pub default_queue: QueueName,
    /// Accepted bearer tokens. Empty disables the check.
    pub auth_tokens: Arc<[String]>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn QueueStore>,
        repo: Arc<dyn JobRepo>,
        authority: Arc<dyn CapabilityAuthority>,
        reports: watch::Receiver<Option<Arc<ReconcileReport>>>,
        config: &JobBoardConfig,
    ) -> Self {
        let assigner = Arc::new(HintQueueAssigner::new(config.default_queue.clone()));
        Self {
            creator: Arc::new(JobCreator::new(store.clone(), repo.clone(), assigner)),
            allocator: Arc::new(Allocator::new(store.clone(), repo.clone())),
            delivery: Arc::new(DeliveryService::new(
                store,
                repo,
                authority,
                Arc::new(PayloadScriptSource),
                config.job_state_url.clone(),
                config.log_parts_url.clone(),
            )),
            reports,
            default_site: config.default_site.clone(),
            default_queue: config.default_queue.clone(),
            auth_tokens: config.auth_tokens.clone().into(),
        }
    }
}
