use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::{PipelineId, ProjectId};
use crate::domains::tasks::models::{Task, TaskType};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Pipeline {
    pub id: PipelineId,
    pub project_id: ProjectId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Pipeline {
    pub async fn find_by_id_optional(id: PipelineId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM pipelines WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn create(project_id: ProjectId, name: &str, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO pipelines (project_id, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(project_id)
        .bind(name)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Most recent task of each type in the pipeline.
    ///
    /// Ties on `created_at` go to the greater id.
    pub async fn latest_tasks_by_type(
        id: PipelineId,
        pool: &PgPool,
    ) -> Result<BTreeMap<TaskType, Task>> {
        let tasks = sqlx::query_as::<_, Task>(
            r#"
            SELECT DISTINCT ON (task_type) *
            FROM tasks
            WHERE pipeline_id = $1
            ORDER BY task_type, created_at DESC, id DESC
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        tasks
            .into_iter()
            .map(|task| Ok((task.task_type()?, task)))
            .collect()
    }
}
