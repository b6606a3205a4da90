//! API error handling.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::warn!(status = %status, error = %message, "Request failed");
        }

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<jobboard_core::Error> for ApiError {
    fn from(err: jobboard_core::Error) -> Self {
        match err {
            jobboard_core::Error::NotFound(msg) => ApiError::NotFound(msg),
            jobboard_core::Error::Invalid(msg) => ApiError::BadRequest(msg),
            jobboard_core::Error::Forbidden(msg) => ApiError::Forbidden(msg),
            jobboard_core::Error::Conflict(msg) => ApiError::Conflict(msg),
            jobboard_core::Error::StoreUnavailable(msg) => ApiError::Unavailable(msg),
            jobboard_core::Error::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_status_codes() {
        let cases = [
            (jobboard_core::Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (jobboard_core::Error::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (jobboard_core::Error::Invalid("x".into()), StatusCode::BAD_REQUEST),
            (jobboard_core::Error::Conflict("x".into()), StatusCode::CONFLICT),
            (
                jobboard_core::Error::StoreUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                jobboard_core::Error::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
