pub mod ai_model;
pub mod task;

pub use ai_model::AiModel;
pub use task::{NewTask, Task, TaskFilter, TaskStatus, TaskType};
