//! Store error types.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt entry at {key}: {message}")]
    Corrupt { key: String, message: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for jobboard_core::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Corrupt { .. } => jobboard_core::Error::Internal(err.to_string()),
            _ => jobboard_core::Error::StoreUnavailable(err.to_string()),
        }
    }
}
