//! Worker and producer job endpoints.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use jobboard_core::{AllocatedJob, JobId, JobScript, NewJob, QueueName, Site};
use jobboard_scheduler::AllocationRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AppState;
use crate::auth::{require_token, worker_from};
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(allocate))
        .route("/add", post(add_job))
        .route("/{job_id}", get(fetch_job).delete(delete_job))
}

#[derive(Debug, Deserialize)]
struct SiteQuery {
    site: Option<String>,
}

fn resolve_site(state: &AppState, raw: Option<String>) -> Result<Site, ApiError> {
    match raw {
        Some(site) => Ok(Site::new(site)?),
        None => Ok(state.default_site.clone()),
    }
}

fn parse_job_id(raw: String) -> Result<JobId, ApiError> {
    Ok(JobId::new(raw)?)
}

#[derive(Debug, Deserialize)]
struct AllocateQuery {
    queue: Option<String>,
    count: Option<usize>,
    site: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AllocateBody {
    /// Jobs the worker is still running.
    #[serde(default)]
    jobs: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AllocateResponse {
    jobs: Vec<AllocatedJob>,
    unavailable_jobs: Vec<JobId>,
    #[serde(rename = "@count")]
    count: usize,
    #[serde(rename = "@queue")]
    queue: QueueName,
}

async fn allocate(
    State(state): State<AppState>,
    Query(query): Query<AllocateQuery>,
    headers: HeaderMap,
    Json(body): Json<AllocateBody>,
) -> Result<Json<AllocateResponse>, ApiError> {
    require_token(&state, &headers)?;
    let site = resolve_site(&state, query.site)?;
    let worker = worker_from(&headers, &site)?;
    let queue = match query.queue {
        Some(queue) => QueueName::new(queue)?,
        None => state.default_queue.clone(),
    };
    let held = body
        .jobs
        .into_iter()
        .map(parse_job_id)
        .collect::<Result<Vec<_>, _>>()?;

    let allocation = state
        .allocator
        .allocate(AllocationRequest {
            worker,
            queue,
            count: query.count.unwrap_or(1),
            held,
        })
        .await?;

    Ok(Json(AllocateResponse {
        count: allocation.jobs.len(),
        jobs: allocation.jobs,
        unavailable_jobs: allocation.unavailable,
        queue: allocation.queue,
    }))
}

async fn add_job(
    State(state): State<AppState>,
    Query(query): Query<SiteQuery>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<StatusCode, ApiError> {
    require_token(&state, &headers)?;
    let site = resolve_site(&state, query.site)?;

    let id = match body.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(ApiError::BadRequest("job id is required".to_string())),
    };
    let queue_hint = body
        .get("queue")
        .and_then(Value::as_str)
        .map(str::to_string);

    state
        .creator
        .create(
            &site,
            NewJob {
                id,
                queue_hint,
                payload: body,
            },
        )
        .await?;

    Ok(StatusCode::CREATED)
}

#[derive(Debug, Serialize)]
struct JobViewResponse {
    job_id: JobId,
    job_script: JobScript,
    job_state_url: String,
    log_parts_url: String,
    jwt: String,
}

async fn fetch_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<SiteQuery>,
    headers: HeaderMap,
) -> Result<Json<JobViewResponse>, ApiError> {
    require_token(&state, &headers)?;
    let site = resolve_site(&state, query.site)?;
    let worker = worker_from(&headers, &site)?;
    let job_id = parse_job_id(job_id)?;

    let view = state.delivery.fetch(&job_id, &worker).await?;
    Ok(Json(JobViewResponse {
        job_id: view.job_id,
        job_script: view.job_script,
        job_state_url: view.job_state_url,
        log_parts_url: view.log_parts_url,
        jwt: view.capability_token,
    }))
}

/// Authorized by the job's capability token rather than a worker token.
async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let job_id = parse_job_id(job_id)?;
    let capability = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Forbidden("missing capability token".to_string()))?;

    state.delivery.delete(&job_id, capability).await?;
    Ok(StatusCode::NO_CONTENT)
}
