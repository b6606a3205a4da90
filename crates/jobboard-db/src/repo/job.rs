//! Job record repository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobboard_core::{JobId, JobRecord, QueueName, Site};
use sqlx::PgPool;

use crate::{DbError, DbResult};

/// A job row from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct JobRow {
    job_id: String,
    site: String,
    queue: String,
    data: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = DbError;

    fn try_from(row: JobRow) -> DbResult<Self> {
        let corrupt = |e: jobboard_core::Error| DbError::Corrupt(format!("job {}: {}", row.job_id, e));
        Ok(JobRecord {
            job_id: JobId::new(row.job_id.clone()).map_err(corrupt)?,
            site: Site::new(row.site.clone()).map_err(corrupt)?,
            queue: QueueName::new(row.queue.clone()).map_err(corrupt)?,
            payload: row.data,
            created_at: row.created_at,
        })
    }
}

/// Write-once store of durable job records.
#[async_trait]
pub trait JobRepo: Send + Sync {
    /// Persist a new record. Fails with [`DbError::Duplicate`] if the id exists.
    async fn create(
        &self,
        site: &Site,
        queue: &QueueName,
        job_id: &JobId,
        payload: &serde_json::Value,
    ) -> DbResult<JobRecord>;

    async fn get(&self, job_id: &JobId) -> DbResult<JobRecord>;

    /// Fetch every record among `ids` that still exists.
    async fn find_many(&self, ids: &[JobId]) -> DbResult<HashMap<JobId, JobRecord>>;

    /// Delete a record, returning whether one existed.
    async fn delete(&self, job_id: &JobId) -> DbResult<bool>;
}

/// PostgreSQL implementation of JobRepo.
pub struct PgJobRepo {
    pool: PgPool,
}

impl PgJobRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepo for PgJobRepo {
    async fn create(
        &self,
        site: &Site,
        queue: &QueueName,
        job_id: &JobId,
        payload: &serde_json::Value,
    ) -> DbResult<JobRecord> {
        let result = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (job_id, site, queue, data, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING *
            "#,
        )
        .bind(job_id.as_str())
        .bind(site.as_str())
        .bind(queue.as_str())
        .bind(payload)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => row.try_into(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DbError::Duplicate(format!("job {}", job_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, job_id: &JobId) -> DbResult<JobRecord> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE job_id = $1")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job {}", job_id)))?;
        row.try_into()
    }

    async fn find_many(&self, ids: &[JobId]) -> DbResult<HashMap<JobId, JobRecord>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let raw: Vec<&str> = ids.iter().map(JobId::as_str).collect();
        let rows = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE job_id = ANY($1)")
            .bind(&raw)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let record = JobRecord::try_from(row)?;
                Ok((record.job_id.clone(), record))
            })
            .collect()
    }

    async fn delete(&self, job_id: &JobId) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE job_id = $1")
            .bind(job_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
