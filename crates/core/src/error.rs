use std::time::Duration;

use studio_llm::provider::LlmError;

use crate::types::{MemoryKind, TaskStatus};

/// Key-value store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),
    #[error("{kind:?} changed concurrently: expected revision {expected}, found {actual}")]
    Conflict { kind: MemoryKind, expected: u64, actual: u64 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures at the model boundary.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("video job failed: {0}")]
    VideoFailed(String),
    #[error("video job still pending after {polls} polls ({waited:?})")]
    Timeout { waited: Duration, polls: u32 },
    #[error("request cancelled")]
    Cancelled,
}

/// Errors surfaced by feature calls. One alert per failure; nothing retries.
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("task cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("no task with id {0}")]
    TaskNotFound(uuid::Uuid),
}
