//! Shared queue state for the job board.
//!
//! Provides the [`QueueStore`] and [`LivenessRegistry`] traits with a Redis
//! implementation for production and an in-memory implementation with the
//! same transactional contract for tests and single-process use.

pub mod error;
pub mod keys;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryQueueStore;
pub use redis_store::RedisQueueStore;
pub use store::{Claim, LivenessRegistry, QueueDepth, QueueStore};
