use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use std::collections::BTreeMap;

use crate::common::{ProjectId, UserId};

/// Progress value recorded once triples have been extracted.
pub const PROGRESS_TRIPLES_EXTRACTED: i32 = 3;

/// Project - owns materials, pipelines and the extracted triple blobs
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: ProjectId,
    pub user_id: UserId,
    pub name: String,
    pub project_progress: i32,
    pub triple_url: Option<String>,
    pub triple_type_url: Json<BTreeMap<String, String>>,
    pub extract_config: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub async fn find_by_id<'e>(id: ProjectId, executor: impl PgExecutor<'e>) -> Result<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM projects WHERE id = $1")
            .bind(id)
            .fetch_one(executor)
            .await
            .with_context(|| format!("Project {} not found", id))
    }

    pub async fn find_by_id_optional(id: ProjectId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn create(user_id: UserId, name: &str, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO projects (user_id, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(user_id)
        .bind(name)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Remember the extraction settings last used for this project.
    pub async fn update_extract_config<'e>(
        id: ProjectId,
        config: &serde_json::Value,
        executor: impl PgExecutor<'e>,
    ) -> Result<()> {
        sqlx::query("UPDATE projects SET extract_config = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(config)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Record the aggregate and per-type triple blobs.
    pub async fn set_triple_urls<'e>(
        id: ProjectId,
        triple_url: &str,
        triple_type_url: &BTreeMap<String, String>,
        executor: impl PgExecutor<'e>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE projects
            SET triple_url = $2, triple_type_url = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(triple_url)
        .bind(Json(triple_type_url))
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Raise progress to at least `progress`; never lowers it.
    pub async fn raise_progress<'e>(
        id: ProjectId,
        progress: i32,
        executor: impl PgExecutor<'e>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE projects
            SET project_progress = GREATEST(project_progress, $2), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(progress)
        .execute(executor)
        .await?;
        Ok(())
    }
}
