//! Test fixtures for creating test data.
//!
//! These fixtures use the model methods directly to create test data.

use anyhow::Result;
use extraction_client::{RemoteTaskStatus, TaskFileResult};
use kg_server::common::{MaterialId, UserId};
use kg_server::domains::billing::{UserPlan, UserSubscription};
use kg_server::domains::pipelines::Pipeline;
use kg_server::domains::projects::{Material, Project};
use kg_server::domains::tasks::{NewTask, Task};
use serde_json::json;
use sqlx::PgPool;
use std::collections::HashMap;

/// A user id nobody else in the shared database has used.
pub fn unique_user_id() -> UserId {
    let (high, _) = uuid::Uuid::new_v4().as_u64_pair();
    UserId::new(((high >> 2) as i64) | 1)
}

/// Project with one pipeline, owned by a fresh user.
pub struct ProjectFixture {
    pub user_id: UserId,
    pub project: Project,
    pub pipeline: Pipeline,
}

pub async fn create_project(pool: &PgPool) -> Result<ProjectFixture> {
    let user_id = unique_user_id();
    let project = Project::create(user_id, "Test Project", pool).await?;
    let pipeline = Pipeline::create(project.id, "Default pipeline", pool).await?;
    Ok(ProjectFixture {
        user_id,
        project,
        pipeline,
    })
}

pub async fn create_subscription(
    pool: &PgPool,
    user_id: UserId,
    plan: UserPlan,
    words_used: i64,
    model: Option<&str>,
) -> Result<UserSubscription> {
    UserSubscription::upsert(user_id, plan, words_used, model, pool).await
}

/// Material with an OCR text file next to its source document.
pub async fn create_material(pool: &PgPool, fixture: &ProjectFixture, name: &str) -> Result<Material> {
    Material::create(
        fixture.project.id,
        &format!("https://files.example.com/uploads/{}.pdf", name),
        Some(&format!("https://files.example.com/ocr/{}.txt", name)),
        pool,
    )
    .await
}

pub async fn create_task(
    pool: &PgPool,
    fixture: &ProjectFixture,
    task_type: &str,
    materials: &[&Material],
) -> Result<Task> {
    let task = Task::create(
        &NewTask {
            task_type: task_type.to_string(),
            pipeline_id: fixture.pipeline.id,
            project_id: fixture.project.id,
            material_ids: materials.iter().map(|m| m.id).collect(),
            model_id: None,
            prompt: Some("Extract people and organizations".to_string()),
            method: None,
        },
        pool,
    )
    .await?;
    Ok(task)
}

/// Where the extraction service left a material's triples.
pub fn output_path(material_id: MaterialId) -> String {
    format!("output/{}/triples.jsonl", material_id)
}

/// A `completed` frame reporting a successful `jsonl` output per material.
pub fn completed_frame(remote_id: &str, materials: &[&Material]) -> RemoteTaskStatus {
    let results = materials
        .iter()
        .map(|material| TaskFileResult {
            file_name: material.file_name().to_string(),
            material_id: Some(material.id.get()),
            status: "success".to_string(),
            triples_count: 1,
            output_files: Some(HashMap::from([(
                "jsonl".to_string(),
                output_path(material.id),
            )])),
            error: None,
        })
        .collect();

    RemoteTaskStatus {
        task_id: remote_id.to_string(),
        status: "completed".to_string(),
        progress: Some(100.0),
        results: Some(results),
        ..Default::default()
    }
}

/// One triple record as the extraction service writes it.
pub fn triple_record(head: (&str, &str), rel: &str, tail: (&str, &str), source_text: &str) -> serde_json::Value {
    json!({
        "head": {"type": head.0, "label": head.1},
        "relationship": {"type": rel, "label": rel},
        "tail": {"type": tail.0, "label": tail.1},
        "_chunk_index": 0,
        "_source_text": source_text,
    })
}

/// Compact JSON array holding a single triple whose text counts as exactly
/// `words` words.
pub fn triples_with_word_count(words: usize) -> String {
    let source_text = vec!["word"; words].join(" ");
    let record = triple_record(("Person", "Ada"), "worksAt", ("Org", "Acme"), &source_text);
    serde_json::to_string(&vec![record]).expect("serializable")
}
