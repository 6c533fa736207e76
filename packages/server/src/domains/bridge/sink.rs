use anyhow::Result;
use async_trait::async_trait;
use extraction_client::RemoteTaskStatus;

use crate::common::TaskId;
use crate::domains::billing::QuotaError;

/// Result of applying a `completed` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed,
    /// The task was already completed or failed; nothing was written.
    AlreadyTerminal,
    /// Usage charge refused; the transaction was rolled back and the task
    /// left as it was.
    QuotaRejected(QuotaError),
}

/// Where the bridge writes task state.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// pending -> processing. Returns `false` if nothing changed.
    async fn mark_processing(&self, task_id: TaskId) -> Result<bool>;

    /// Apply a terminal success frame atomically.
    async fn complete(&self, task_id: TaskId, frame: &RemoteTaskStatus)
        -> Result<CompletionOutcome>;

    /// Record a terminal failure. Returns `false` if the task was already terminal.
    async fn fail(&self, task_id: TaskId, reason: &str) -> Result<bool>;
}
