//! Task submission
//!
//! Persists a pending task, hands the job to the extraction service and
//! attaches a status stream to it. There is no retry: a rejected submission
//! leaves the task failed with the remote error.

use extraction_client::{CreateJobRequest, JobFile};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::common::{AiModelId, MaterialId, PipelineId, ProjectId};
use crate::config::LlmSettings;
use crate::domains::projects::{Material, Project};
use crate::domains::tasks::error::{TaskError, TaskResult};
use crate::domains::tasks::models::{AiModel, NewTask, Task, TaskType};
use crate::kernel::ServerDeps;

/// Request body for `POST /api/tasks`
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitTask {
    #[serde(rename = "type")]
    pub task_type: String,
    pub pipeline_id: PipelineId,
    pub project_id: ProjectId,
    pub material_id_list: Vec<MaterialId>,
    #[serde(default)]
    pub model_id: Option<AiModelId>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    /// Extraction settings stored on the project for extract tasks
    #[serde(default)]
    pub extract_config: Option<Value>,
}

impl SubmitTask {
    fn new_task(&self) -> NewTask {
        NewTask {
            task_type: self.task_type.clone(),
            pipeline_id: self.pipeline_id,
            project_id: self.project_id,
            material_ids: self.material_id_list.clone(),
            model_id: self.model_id,
            prompt: self.prompt.clone(),
            method: self.method.clone(),
        }
    }
}

/// Create a task and start its remote job.
pub async fn submit_task(input: SubmitTask, deps: &ServerDeps) -> TaskResult<Task> {
    let new_task = input.new_task();
    let task_type = new_task.validate()?;

    if Project::find_by_id_optional(input.project_id, &deps.db_pool)
        .await?
        .is_none()
    {
        return Err(TaskError::validation(format!(
            "project {} does not exist",
            input.project_id
        )));
    }

    if task_type == TaskType::Extract {
        if let Some(config) = &input.extract_config {
            Project::update_extract_config(input.project_id, config, &deps.db_pool).await?;
        }
    }

    let task = Task::create(&new_task, &deps.db_pool).await?;
    info!(task_id = %task.id, task_type = %task_type, "Task created");

    let request = match build_job_request(&task, task_type, deps).await {
        Ok(request) => request,
        Err(e) => {
            fail_quietly(&task, &e.to_string(), deps).await;
            return Err(e);
        }
    };

    let created = match deps.extraction.create_job(&request).await {
        Ok(created) => created,
        Err(e) => {
            error!(task_id = %task.id, error = %e, "Remote job submission failed");
            fail_quietly(&task, &e.to_string(), deps).await;
            return Err(e.into());
        }
    };

    let task = Task::set_remote_job(task.id, &created.task_id, &deps.db_pool).await?;
    info!(
        task_id = %task.id,
        remote_id = %created.task_id,
        remote_status = %created.status,
        "Remote job submitted"
    );

    if let Err(e) = deps.bridge.open_stream(&created.task_id, task.id).await {
        error!(task_id = %task.id, remote_id = %created.task_id, error = %e, "Failed to attach status stream");
        fail_quietly(&task, &e.to_string(), deps).await;
        return Err(e.into());
    }

    Ok(task)
}

async fn build_job_request(
    task: &Task,
    task_type: TaskType,
    deps: &ServerDeps,
) -> TaskResult<CreateJobRequest> {
    let materials = Material::find_by_ids(&task.material_id_list, &deps.db_pool).await?;

    if let Some(missing) = task
        .material_id_list
        .iter()
        .find(|id| !materials.iter().any(|m| m.id == **id))
    {
        return Err(TaskError::validation(format!(
            "material {} does not exist",
            missing
        )));
    }
    if let Some(foreign) = materials.iter().find(|m| m.project_id != task.project_id) {
        return Err(TaskError::validation(format!(
            "material {} belongs to another project",
            foreign.id
        )));
    }

    // Extraction reads the OCR text when there is one.
    let prefer_ocr_text = task_type == TaskType::Extract;
    let files = materials
        .iter()
        .map(|material| JobFile {
            material_id: material.id.get(),
            url: material.source_url(prefer_ocr_text).to_string(),
        })
        .collect();

    let (provider, model) = resolve_model(task.model_id, &deps.llm, deps).await?;

    Ok(CreateJobRequest {
        files,
        prompt_text: task.prompt.clone().unwrap_or_default(),
        provider,
        model,
        api_key: deps.llm.api_key.clone(),
        base_url: deps.llm.base_url.clone(),
    })
}

/// The task's catalog model, falling back to the configured defaults.
async fn resolve_model(
    model_id: Option<AiModelId>,
    defaults: &LlmSettings,
    deps: &ServerDeps,
) -> TaskResult<(String, Option<String>)> {
    let Some(model_id) = model_id else {
        return Ok((defaults.provider.clone(), defaults.model.clone()));
    };

    match AiModel::find_by_id_optional(model_id, &deps.db_pool).await? {
        Some(model) => Ok((model.provider, Some(model.model_code))),
        None => Err(TaskError::validation(format!(
            "model {} does not exist",
            model_id
        ))),
    }
}

async fn fail_quietly(task: &Task, reason: &str, deps: &ServerDeps) {
    if let Err(e) = Task::mark_failed(task.id, reason, &deps.db_pool).await {
        warn!(task_id = %task.id, error = %e, "Failed to record submission failure");
    }
}
