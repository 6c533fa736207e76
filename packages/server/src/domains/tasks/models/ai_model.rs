use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::AiModelId;

/// Catalog entry mapping a model id to the provider/model pair the
/// extraction service understands.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AiModel {
    pub id: AiModelId,
    pub provider: String,
    pub model_code: String,
    pub name: String,
    pub status: String,
}

impl AiModel {
    pub async fn find_by_id_optional(id: AiModelId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM models WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn create(provider: &str, model_code: &str, name: &str, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO models (provider, model_code, name)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(provider)
        .bind(model_code)
        .bind(name)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}
