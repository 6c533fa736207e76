use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};

use crate::common::{AiModelId, MaterialId, PipelineId, ProjectId, TaskId, ValidatedPage};
use crate::domains::tasks::error::{TaskError, TaskResult};

/// Task - one unit of work executed by the remote extraction service.
///
/// Status only moves forward: pending -> processing -> completed | failed.
/// Every status write below is guarded so a terminal task is never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: TaskId,
    pub task_type: String, // 'ocr', 'extract', 'graph'
    pub pipeline_id: PipelineId,
    pub project_id: ProjectId,
    pub material_id_list: Vec<MaterialId>,
    pub model_id: Option<AiModelId>,
    pub prompt: Option<String>,
    pub method: Option<String>,
    pub remote_job_id: Option<String>,
    pub status: String, // 'pending', 'processing', 'completed', 'failed'
    pub error_message: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Ocr,
    Extract,
    Graph,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Ocr => write!(f, "ocr"),
            TaskType::Extract => write!(f, "extract"),
            TaskType::Graph => write!(f, "graph"),
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ocr" => Ok(TaskType::Ocr),
            "extract" => Ok(TaskType::Extract),
            "graph" => Ok(TaskType::Graph),
            _ => Err(anyhow::anyhow!("Invalid task type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Processing => write!(f, "processing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid task status: {}", s)),
        }
    }
}

/// Input for creating a task
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub task_type: String,
    pub pipeline_id: PipelineId,
    pub project_id: ProjectId,
    pub material_ids: Vec<MaterialId>,
    #[serde(default)]
    pub model_id: Option<AiModelId>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
}

impl NewTask {
    /// Check the input before anything is persisted.
    pub fn validate(&self) -> TaskResult<TaskType> {
        let raw_type = self.task_type.trim();
        if raw_type.is_empty() {
            return Err(TaskError::validation("task type is required"));
        }
        let task_type: TaskType = raw_type.parse().map_err(|_| {
            TaskError::validation(format!(
                "unsupported task type '{}', expected ocr, extract or graph",
                raw_type
            ))
        })?;

        if self.material_ids.is_empty() {
            return Err(TaskError::validation("at least one material is required"));
        }
        if let Some(bad) = self.material_ids.iter().find(|id| !id.is_valid()) {
            return Err(TaskError::validation(format!("invalid material id {}", bad)));
        }
        if !self.pipeline_id.is_valid() || !self.project_id.is_valid() {
            return Err(TaskError::validation(
                "pipeline_id and project_id must be positive",
            ));
        }

        Ok(task_type)
    }
}

/// List filter: at least one of the two must be set.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TaskFilter {
    pub project_id: Option<ProjectId>,
    pub pipeline_id: Option<PipelineId>,
}

impl Task {
    pub fn task_type(&self) -> Result<TaskType> {
        self.task_type.parse()
    }

    pub fn status(&self) -> Result<TaskStatus> {
        self.status.parse()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().map(TaskStatus::is_terminal).unwrap_or(false)
    }

    /// Create a task in `pending` state.
    pub async fn create(input: &NewTask, pool: &PgPool) -> TaskResult<Self> {
        let task_type = input.validate()?;

        let task = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO tasks (
                task_type, pipeline_id, project_id, material_id_list,
                model_id, prompt, method, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
            RETURNING *
            "#,
        )
        .bind(task_type.to_string())
        .bind(input.pipeline_id)
        .bind(input.project_id)
        .bind(&input.material_ids)
        .bind(input.model_id)
        .bind(&input.prompt)
        .bind(&input.method)
        .fetch_one(pool)
        .await
        .map_err(anyhow::Error::from)?;

        Ok(task)
    }

    pub async fn find_by_id_optional<'e>(
        id: TaskId,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn get(id: TaskId, pool: &PgPool) -> TaskResult<Self> {
        Self::find_by_id_optional(id, pool)
            .await?
            .ok_or(TaskError::NotFound(id))
    }

    /// Read and lock the task row for the rest of the transaction.
    pub async fn find_for_update<'e>(
        id: TaskId,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM tasks WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_remote_job(remote_job_id: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM tasks WHERE remote_job_id = $1")
            .bind(remote_job_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Newest first, with the total number of matching tasks.
    pub async fn list(
        filter: &TaskFilter,
        page: &ValidatedPage,
        pool: &PgPool,
    ) -> TaskResult<(Vec<Self>, i64)> {
        if filter.project_id.is_none() && filter.pipeline_id.is_none() {
            return Err(TaskError::validation(
                "project_id or pipeline_id is required",
            ));
        }

        let tasks = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM tasks
            WHERE ($1::BIGINT IS NULL OR project_id = $1)
              AND ($2::BIGINT IS NULL OR pipeline_id = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.project_id)
        .bind(filter.pipeline_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await
        .map_err(anyhow::Error::from)?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM tasks
            WHERE ($1::BIGINT IS NULL OR project_id = $1)
              AND ($2::BIGINT IS NULL OR pipeline_id = $2)
            "#,
        )
        .bind(filter.project_id)
        .bind(filter.pipeline_id)
        .fetch_one(pool)
        .await
        .map_err(anyhow::Error::from)?;

        Ok((tasks, total))
    }

    /// Record the external job id; marks `start_time` if it was unset.
    pub async fn set_remote_job<'e>(
        id: TaskId,
        remote_job_id: &str,
        executor: impl PgExecutor<'e>,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE tasks
            SET remote_job_id = $2,
                start_time = COALESCE(start_time, NOW()),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(remote_job_id)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    /// pending -> processing. Returns `false` when the task was not pending.
    pub async fn mark_processing<'e>(id: TaskId, executor: impl PgExecutor<'e>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'processing',
                start_time = COALESCE(start_time, NOW()),
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move a non-terminal task to completed.
    pub async fn mark_completed<'e>(id: TaskId, executor: impl PgExecutor<'e>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'completed',
                error_message = NULL,
                finish_time = COALESCE(finish_time, NOW()),
                updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move a non-terminal task to failed with `message`.
    pub async fn mark_failed<'e>(
        id: TaskId,
        message: &str,
        executor: impl PgExecutor<'e>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'failed',
                error_message = $2,
                finish_time = COALESCE(finish_time, NOW()),
                updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(id)
        .bind(message)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task(task_type: &str, materials: &[i64]) -> NewTask {
        NewTask {
            task_type: task_type.to_string(),
            pipeline_id: PipelineId::new(1),
            project_id: ProjectId::new(1),
            material_ids: materials.iter().copied().map(MaterialId::new).collect(),
            model_id: None,
            prompt: None,
            method: None,
        }
    }

    #[test]
    fn test_validate_accepts_known_types() {
        assert_eq!(new_task("ocr", &[1]).validate().unwrap(), TaskType::Ocr);
        assert_eq!(new_task(" extract ", &[1, 2]).validate().unwrap(), TaskType::Extract);
        assert_eq!(new_task("graph", &[3]).validate().unwrap(), TaskType::Graph);
    }

    #[test]
    fn test_validate_rejects_bad_type() {
        assert!(matches!(
            new_task("", &[1]).validate(),
            Err(TaskError::Validation(_))
        ));
        assert!(matches!(
            new_task("summarize", &[1]).validate(),
            Err(TaskError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_materials() {
        let err = new_task("extract", &[]).validate().unwrap_err();
        assert!(err.to_string().contains("at least one material"));
        assert!(new_task("extract", &[0]).validate().is_err());
    }

    #[test]
    fn test_status_terminality() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert_eq!("failed".parse::<TaskStatus>().unwrap(), TaskStatus::Failed);
    }
}
