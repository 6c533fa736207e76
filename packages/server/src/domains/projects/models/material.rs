use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};

use crate::common::{MaterialId, ProjectId};

/// Material - a source document belonging to a project
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Material {
    pub id: MaterialId,
    pub project_id: ProjectId,
    pub url: String,
    pub ocr_text_url: Option<String>,
    pub triple_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Material {
    /// Last path segment of the source URL.
    pub fn file_name(&self) -> &str {
        let path = self.url.split(['?', '#']).next().unwrap_or(&self.url);
        path.rsplit('/').next().unwrap_or(path)
    }

    /// File name without its extension.
    pub fn file_stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(pos) if pos > 0 => &name[..pos],
            _ => name,
        }
    }

    /// URL handed to the extraction service for the given task kind.
    pub fn source_url(&self, prefer_ocr_text: bool) -> &str {
        match (&self.ocr_text_url, prefer_ocr_text) {
            (Some(ocr), true) if !ocr.is_empty() => ocr,
            _ => &self.url,
        }
    }

    /// Load materials keeping the order of `ids`; unknown ids are omitted.
    pub async fn find_by_ids<'e>(
        ids: &[MaterialId],
        executor: impl PgExecutor<'e>,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM materials
            WHERE id = ANY($1)
            ORDER BY array_position($1, id)
            "#,
        )
        .bind(ids)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn create(
        project_id: ProjectId,
        url: &str,
        ocr_text_url: Option<&str>,
        pool: &PgPool,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO materials (project_id, url, ocr_text_url)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(url)
        .bind(ocr_text_url)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn set_triple_url<'e>(
        id: MaterialId,
        triple_url: &str,
        executor: impl PgExecutor<'e>,
    ) -> Result<()> {
        sqlx::query("UPDATE materials SET triple_url = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(triple_url)
            .execute(executor)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(url: &str, ocr: Option<&str>) -> Material {
        Material {
            id: MaterialId::new(1),
            project_id: ProjectId::new(1),
            url: url.to_string(),
            ocr_text_url: ocr.map(String::from),
            triple_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_file_name_and_stem() {
        let m = material("https://files.example/u/7/合同.v2.docx?sig=abc", None);
        assert_eq!(m.file_name(), "合同.v2.docx");
        assert_eq!(m.file_stem(), "合同.v2");

        let m = material("report", None);
        assert_eq!(m.file_name(), "report");
        assert_eq!(m.file_stem(), "report");
    }

    #[test]
    fn test_source_url_prefers_ocr_text_when_asked() {
        let m = material("a.pdf", Some("a.txt"));
        assert_eq!(m.source_url(true), "a.txt");
        assert_eq!(m.source_url(false), "a.pdf");

        let m = material("a.pdf", Some(""));
        assert_eq!(m.source_url(true), "a.pdf");
    }
}
