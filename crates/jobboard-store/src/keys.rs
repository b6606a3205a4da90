//! Key layout in the shared store.
//!
//! | key | type | contents |
//! |---|---|---|
//! | `sites` | set | every site that has ever had a job enqueued |
//! | `queues:{site}` | set | queue names registered in the site |
//! | `workers:{site}` | set | worker ids that have allocated in the site |
//! | `queue:{site}:{queue}` | list | queued job ids, head is served first |
//! | `queue:{site}:{queue}:claims` | hash | job id -> claiming worker id |
//! | `queue:{site}:{queue}:claims:timestamps` | hash | job id -> claim time (unix seconds) |
//! | `worker:{site}:{worker}` | list | job ids claimed by the worker, in claim order |
//! | `worker:{site}:{worker}:idx` | set | same ids, for membership tests |
//! | `worker:{site}:{worker}:alive` | string + TTL | liveness key |

use jobboard_core::{QueueName, Site, WorkerRef};

pub const SITES: &str = "sites";

pub fn queues(site: &Site) -> String {
    format!("queues:{}", site)
}

pub fn workers(site: &Site) -> String {
    format!("workers:{}", site)
}

pub fn queue(site: &Site, queue: &QueueName) -> String {
    format!("queue:{}:{}", site, queue)
}

pub fn claims(site: &Site, queue: &QueueName) -> String {
    format!("queue:{}:{}:claims", site, queue)
}

pub fn claim_timestamps(site: &Site, queue: &QueueName) -> String {
    format!("queue:{}:{}:claims:timestamps", site, queue)
}

/// Prefix shared by every per-worker key in a site.
pub fn worker_prefix(site: &Site) -> String {
    format!("worker:{}:", site)
}

pub fn worker_jobs(worker: &WorkerRef) -> String {
    format!("{}{}", worker_prefix(worker.site()), worker.id())
}

pub fn worker_index(worker: &WorkerRef) -> String {
    format!("{}:idx", worker_jobs(worker))
}

pub fn worker_alive(worker: &WorkerRef) -> String {
    format!("{}:alive", worker_jobs(worker))
}
