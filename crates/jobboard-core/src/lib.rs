//! Core domain types and traits for the job board.
//!
//! This crate contains:
//! - Identifiers for sites, queues, jobs and workers
//! - The job record and the views handed to workers
//! - The error taxonomy shared by every service
//! - Pluggable policies (queue assignment, job scripts, capability tokens)

pub mod assign;
pub mod capability;
pub mod error;
pub mod id;
pub mod job;
pub mod script;

pub use assign::{HintQueueAssigner, QueueAssigner};
pub use capability::{CapabilityAuthority, HmacCapabilityAuthority};
pub use error::{Error, Result};
pub use id::{JobId, QueueName, Site, WorkerRef};
pub use job::{AllocatedJob, JobRecord, JobScript, JobView, NewJob};
pub use script::{PayloadScriptSource, ScriptSource};
