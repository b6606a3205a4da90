//! In-memory job repository used by tests and the `memory` backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use jobboard_core::{JobId, JobRecord, QueueName, Site};
use tokio::sync::RwLock;

use crate::{DbError, DbResult, JobRepo};

#[derive(Debug, Default)]
pub struct MemoryJobRepo {
    records: RwLock<HashMap<JobId, JobRecord>>,
}

impl MemoryJobRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl JobRepo for MemoryJobRepo {
    async fn create(
        &self,
        site: &Site,
        queue: &QueueName,
        job_id: &JobId,
        payload: &serde_json::Value,
    ) -> DbResult<JobRecord> {
        let mut records = self.records.write().await;
        if records.contains_key(job_id) {
            return Err(DbError::Duplicate(format!("job {}", job_id)));
        }
        let record = JobRecord {
            job_id: job_id.clone(),
            site: site.clone(),
            queue: queue.clone(),
            payload: payload.clone(),
            created_at: Utc::now(),
        };
        records.insert(job_id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, job_id: &JobId) -> DbResult<JobRecord> {
        self.records
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("job {}", job_id)))
    }

    async fn find_many(&self, ids: &[JobId]) -> DbResult<HashMap<JobId, JobRecord>> {
        let records = self.records.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| records.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }

    async fn delete(&self, job_id: &JobId) -> DbResult<bool> {
        Ok(self.records.write().await.remove(job_id).is_some())
    }
}
