//! Request authentication helpers.

use axum::http::{HeaderMap, header};
use jobboard_core::{Site, WorkerRef};

use crate::AppState;
use crate::error::ApiError;

/// Bearer token from the `Authorization` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Check the request carries one of the configured tokens.
pub fn require_token(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if state.auth_tokens.is_empty() {
        return Ok(());
    }
    match bearer_token(headers) {
        Some(token) if state.auth_tokens.iter().any(|t| t == token) => Ok(()),
        Some(_) => Err(ApiError::Forbidden("unknown token".to_string())),
        None => Err(ApiError::Unauthorized("missing bearer token".to_string())),
    }
}

/// The requesting worker, named by the `From` header.
pub fn worker_from(headers: &HeaderMap, site: &Site) -> Result<WorkerRef, ApiError> {
    let from = headers
        .get(header::FROM)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing From header".to_string()))?;
    Ok(WorkerRef::new(site.clone(), from)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Z3Vlc3Q="));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_worker_from_header() {
        let site = Site::new("test").unwrap();
        let mut headers = HeaderMap::new();
        assert!(matches!(worker_from(&headers, &site), Err(ApiError::BadRequest(_))));

        headers.insert(header::FROM, HeaderValue::from_static("worker+test@localhost"));
        let worker = worker_from(&headers, &site).unwrap();
        assert_eq!(worker.id(), "worker+test@localhost");

        headers.insert(header::FROM, HeaderValue::from_static("bad worker"));
        assert!(matches!(worker_from(&headers, &site), Err(ApiError::BadRequest(_))));
    }
}
