//! Queue assignment policy for new jobs.

use crate::{NewJob, QueueName, Result};

/// Decides which queue a new job lands in.
pub trait QueueAssigner: Send + Sync {
    fn assign(&self, job: &NewJob) -> Result<QueueName>;
}

/// Uses the producer's `queue_hint` when present, otherwise a fixed default.
#[derive(Debug, Clone)]
pub struct HintQueueAssigner {
    default_queue: QueueName,
}

impl HintQueueAssigner {
    pub fn new(default_queue: QueueName) -> Self {
        Self { default_queue }
    }
}

impl QueueAssigner for HintQueueAssigner {
    fn assign(&self, job: &NewJob) -> Result<QueueName> {
        match job.queue_hint.as_deref().map(str::trim) {
            Some(hint) if !hint.is_empty() => QueueName::new(hint),
            _ => Ok(self.default_queue.clone()),
        }
    }
}
