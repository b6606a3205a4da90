//! Job records and the views handed out to workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, QueueName, Site};

/// Producer input for a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    /// Unique job id chosen by the producer.
    pub id: String,
    /// Optional hint used by the queue assigner.
    pub queue_hint: Option<String>,
    /// Arbitrary structured data, persisted verbatim.
    pub payload: serde_json::Value,
}

/// The durable record backing a queued or claimed job id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub site: Site,
    /// Queue the job was assigned to at creation.
    pub queue: QueueName,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A job newly claimed by an allocation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatedJob {
    pub job_id: JobId,
    pub payload: serde_json::Value,
}

impl From<JobRecord> for AllocatedJob {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            payload: record.payload,
        }
    }
}

/// Script delivered to a worker for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobScript {
    pub name: String,
    pub encoding: String,
    pub content: String,
}

/// Everything a worker needs to run a claimed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: JobId,
    pub job_script: JobScript,
    pub job_state_url: String,
    pub log_parts_url: String,
    /// Short-lived token authorizing state/log/delete calls for this job only.
    pub capability_token: String,
}
