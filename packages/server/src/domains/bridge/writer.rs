//! Postgres-backed [`StatusSink`].
//!
//! A `completed` frame is applied in one transaction: the task row is locked,
//! usage is charged, triples are materialized, project progress is raised and
//! the task is marked completed. Notifications go out only after commit.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use extraction_client::RemoteTaskStatus;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::common::{MaterialId, TaskId};
use crate::domains::billing::{count_words, QuotaEnforcer, QuotaError};
use crate::domains::bridge::sink::{CompletionOutcome, StatusSink};
use crate::domains::projects::models::project::PROGRESS_TRIPLES_EXTRACTED;
use crate::domains::projects::{Material, Project};
use crate::domains::tasks::{Task, TaskType};
use crate::domains::triples::{materialize_results, MaterialOutput};
use crate::kernel::{BaseBlobStore, UserChannels};

/// Output kind holding extracted triples.
const TRIPLES_OUTPUT: &str = "jsonl";

#[derive(Clone)]
pub struct TaskStatusWriter {
    db_pool: PgPool,
    blob_store: Arc<dyn BaseBlobStore>,
    quota: QuotaEnforcer,
    channels: UserChannels,
}

impl TaskStatusWriter {
    pub fn new(
        db_pool: PgPool,
        blob_store: Arc<dyn BaseBlobStore>,
        quota: QuotaEnforcer,
        channels: UserChannels,
    ) -> Self {
        Self {
            db_pool,
            blob_store,
            quota,
            channels,
        }
    }

    /// Download the triples file of every material that succeeded, in task order.
    /// Results not tied to a material are ignored.
    async fn download_outputs(
        &self,
        frame: &RemoteTaskStatus,
        materials: Vec<Material>,
    ) -> Vec<MaterialOutput> {
        let paths: HashMap<MaterialId, &str> = frame
            .results()
            .iter()
            .filter(|result| result.succeeded())
            .filter_map(|result| {
                let Some(material_id) = result.material_id else {
                    warn!(file_name = %result.file_name, "Ignoring extraction result without material id");
                    return None;
                };
                result
                    .output_file(TRIPLES_OUTPUT)
                    .map(|path| (MaterialId::new(material_id), path))
            })
            .collect();

        let mut outputs = Vec::with_capacity(paths.len());
        for material in materials {
            let Some(path) = paths.get(&material.id) else {
                continue;
            };
            match self.blob_store.fetch_text(path).await {
                Ok(text) => outputs.push(MaterialOutput { material, text }),
                Err(e) => {
                    warn!(material_id = %material.id, path = %path, error = %e, "Failed to download extraction output");
                }
            }
        }
        outputs
    }
}

#[async_trait]
impl StatusSink for TaskStatusWriter {
    async fn mark_processing(&self, task_id: TaskId) -> Result<bool> {
        Task::mark_processing(task_id, &self.db_pool).await
    }

    async fn complete(
        &self,
        task_id: TaskId,
        frame: &RemoteTaskStatus,
    ) -> Result<CompletionOutcome> {
        let task = Task::find_by_id_optional(task_id, &self.db_pool)
            .await?
            .ok_or_else(|| anyhow!("Task {} not found", task_id))?;
        if task.is_terminal() {
            return Ok(CompletionOutcome::AlreadyTerminal);
        }

        // Triples only come out of extract tasks; other kinds just complete.
        let materializes = task.task_type()? == TaskType::Extract;
        let outputs = if materializes {
            let materials = Material::find_by_ids(&task.material_id_list, &self.db_pool).await?;
            self.download_outputs(frame, materials).await
        } else {
            Vec::new()
        };
        let total_words: u64 = outputs.iter().map(|output| count_words(&output.text)).sum();

        let mut tx = self.db_pool.begin().await?;

        let Some(locked) = Task::find_for_update(task_id, &mut *tx).await? else {
            return Err(anyhow!("Task {} disappeared during completion", task_id));
        };
        if locked.is_terminal() {
            return Ok(CompletionOutcome::AlreadyTerminal);
        }
        let project = Project::find_by_id(locked.project_id, &mut *tx).await?;

        let mut charge = None;
        if materializes {
            charge = match self.quota.charge(project.user_id, total_words, &mut tx).await {
                Ok(charge) => charge,
                Err(e) => match e.downcast::<QuotaError>() {
                    Ok(rejection) => {
                        tx.rollback().await?;
                        warn!(
                            task_id = %task_id,
                            user_id = %project.user_id,
                            error = %rejection,
                            "Completion rejected by quota"
                        );
                        self.channels
                            .publish_json(project.user_id, &rejection.notice());
                        return Ok(CompletionOutcome::QuotaRejected(rejection));
                    }
                    Err(e) => return Err(e),
                },
            };

            materialize_results(&project, &outputs, self.blob_store.as_ref(), &mut tx).await?;
            Project::raise_progress(project.id, PROGRESS_TRIPLES_EXTRACTED, &mut *tx).await?;
        }

        Task::mark_completed(task_id, &mut *tx).await?;
        tx.commit().await?;

        info!(
            task_id = %task_id,
            project_id = %project.id,
            total_words,
            materials = outputs.len(),
            "Task completed"
        );

        if let Some(charge) = charge {
            for notice in charge.notices() {
                self.channels.publish_json(charge.user_id, &notice);
            }
        }

        Ok(CompletionOutcome::Completed)
    }

    async fn fail(&self, task_id: TaskId, reason: &str) -> Result<bool> {
        let updated = Task::mark_failed(task_id, reason, &self.db_pool).await?;
        if updated {
            info!(task_id = %task_id, reason, "Task marked failed");
        }
        Ok(updated)
    }
}
