//! Task cancellation

use tracing::{info, warn};

use crate::common::TaskId;
use crate::domains::tasks::error::{TaskError, TaskResult};
use crate::domains::tasks::models::Task;
use crate::kernel::ServerDeps;

pub const CANCELLED_MESSAGE: &str = "cancelled";

/// Cancel the remote job, stop its stream and mark the task failed.
pub async fn cancel_task(task_id: TaskId, deps: &ServerDeps) -> TaskResult<Task> {
    let task = Task::get(task_id, &deps.db_pool).await?;
    if task.is_terminal() {
        return Err(TaskError::validation(format!(
            "task {} is already {}",
            task_id, task.status
        )));
    }

    if let Some(remote_id) = task.remote_job_id.as_deref() {
        deps.extraction.cancel_job(remote_id).await?;
        if deps.bridge.stop_stream(remote_id) {
            info!(task_id = %task_id, remote_id, "Status stream stopped");
        }
    } else {
        warn!(task_id = %task_id, "Cancelling task without a remote job");
    }

    Task::mark_failed(task_id, CANCELLED_MESSAGE, &deps.db_pool).await?;
    info!(task_id = %task_id, "Task cancelled");

    Task::get(task_id, &deps.db_pool).await
}
