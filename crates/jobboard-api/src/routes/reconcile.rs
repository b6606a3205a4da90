//! Latest reconciliation report.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use jobboard_scheduler::ReconcileReport;

use crate::AppState;
use crate::auth::require_token;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/reconcile", get(latest_report))
}

async fn latest_report(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ReconcileReport>, ApiError> {
    require_token(&state, &headers)?;
    let report = state
        .reports
        .borrow()
        .as_deref()
        .cloned()
        .ok_or_else(|| ApiError::NotFound("no reconciliation has completed yet".to_string()))?;
    Ok(Json(report))
}
