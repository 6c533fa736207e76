//! Tasks domain - lifecycle of remotely executed document-processing jobs.

pub mod activities;
pub mod error;
pub mod models;

pub use activities::{cancel_task, submit_task, SubmitTask};
pub use error::{TaskError, TaskResult};
pub use models::{AiModel, NewTask, Task, TaskFilter, TaskStatus, TaskType};
