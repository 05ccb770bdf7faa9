//! Error types for the job registry.

use thiserror::Error;

/// Errors that can occur in registry and scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Job (or the thing it points at) no longer exists.
    #[error("job not found: {0}")]
    NotFound(String),

    /// Cancellation attempted by someone other than the creator.
    #[error("only the creator may cancel job {0}")]
    NotAuthorized(String),

    /// Could not obtain a named lock within the configured wait bound.
    #[error("timed out waiting for lock: {0}")]
    LockTimeout(String),

    /// Lock backing store unreachable; no partial acquisition happened.
    #[error("lock backend unavailable: {0}")]
    LockUnavailable(String),

    /// Rejected before any job was created or any external call made.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Backing store failure.
    #[error("store error: {0}")]
    Store(String),
}

impl From<redis::RedisError> for SchedulerError {
    fn from(e: redis::RedisError) -> Self {
        SchedulerError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(e: serde_json::Error) -> Self {
        SchedulerError::Store(format!("corrupt job record: {e}"))
    }
}
