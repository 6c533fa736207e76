use extraction_client::ExtractionError;
use thiserror::Error;

use crate::common::TaskId;
use crate::domains::bridge::BridgeError;

/// Errors surfaced by task operations.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Task {0} not found")]
    NotFound(TaskId),

    #[error("Extraction service error: {0}")]
    Remote(#[from] ExtractionError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl TaskError {
    pub fn validation(message: impl Into<String>) -> Self {
        TaskError::Validation(message.into())
    }
}

pub type TaskResult<T> = std::result::Result<T, TaskError>;
