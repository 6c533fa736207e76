//! End-to-end task flow: submission, status streaming and cancellation
//! against a scripted extraction service.

mod common;

use std::sync::Arc;

use common::*;
use extraction_client::ExtractionError;
use kg_server::common::{PageArgs, TaskId};
use kg_server::domains::billing::{UserPlan, UserSubscription};
use kg_server::domains::bridge::BridgeError;
use kg_server::domains::projects::{Material, Project};
use kg_server::domains::tasks::{
    cancel_task, submit_task, SubmitTask, Task, TaskError, TaskFilter, TaskStatus,
};
use kg_server::kernel::test_dependencies::{MockBlobStore, MockExtractionService};
use kg_server::kernel::{ServerDeps, TestDependencies};
use serde_json::json;
use sqlx::PgPool;
use test_context::test_context;

fn unique_prefix() -> String {
    format!("job-{}", uuid::Uuid::new_v4().simple())
}

fn data(frame: serde_json::Value) -> String {
    format!("data: {}", frame)
}

fn submit_request(fixture: &ProjectFixture, task_type: &str, materials: &[&Material]) -> SubmitTask {
    SubmitTask {
        task_type: task_type.to_string(),
        pipeline_id: fixture.pipeline.id,
        project_id: fixture.project.id,
        material_id_list: materials.iter().map(|m| m.id).collect(),
        model_id: None,
        prompt: Some("Extract people and organizations".to_string()),
        method: None,
        extract_config: Some(json!({"chunk_size": 800})),
    }
}

async fn wait_for_status(pool: &PgPool, task_id: TaskId, status: TaskStatus) -> Task {
    eventually(|| async {
        let task = Task::get(task_id, pool).await.ok()?;
        (task.status().ok()? == status).then_some(task)
    })
    .await
}

fn deps_with(
    ctx: &TestHarness,
    extraction: MockExtractionService,
    blobs: MockBlobStore,
) -> (ServerDeps, Arc<MockExtractionService>) {
    let mocks = TestDependencies::new()
        .mock_extraction(extraction)
        .mock_blob_store(blobs);
    let extraction = mocks.extraction.clone();
    (ctx.deps(mocks), extraction)
}

#[test_context(TestHarness)]
#[tokio::test]
async fn extract_task_streams_to_completion(ctx: &TestHarness) {
    let pool = &ctx.db_pool;
    let fixture = create_project(pool).await.unwrap();
    create_subscription(pool, fixture.user_id, UserPlan::Professional, 0, None)
        .await
        .unwrap();
    let material = create_material(pool, &fixture, "contract").await.unwrap();

    let mock = MockExtractionService::new().with_job_prefix(&unique_prefix());
    let remote_id = mock.job_id(1);
    let completed = serde_json::to_value(completed_frame(&remote_id, &[&material])).unwrap();
    let mock = mock.with_stream(
        &remote_id,
        &[
            &data(json!({"task_id": remote_id, "status": "pending"})),
            &data(json!({"type": "heartbeat", "timestamp": "2024-05-01T10:00:00"})),
            &data(json!({"task_id": remote_id, "status": "processing", "progress": 40.0})),
            &data(completed),
        ],
    );
    let blobs = MockBlobStore::new().with_file(&output_path(material.id), &triples_with_word_count(12));
    let (deps, extraction) = deps_with(ctx, mock, blobs);

    let task = submit_task(submit_request(&fixture, "extract", &[&material]), &deps)
        .await
        .unwrap();
    assert_eq!(task.remote_job_id.as_deref(), Some(remote_id.as_str()));
    assert!(task.start_time.is_some());

    let done = wait_for_status(pool, task.id, TaskStatus::Completed).await;
    assert!(done.finish_time.is_some());

    let calls = extraction.create_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].files.len(), 1);
    assert_eq!(calls[0].files[0].material_id, material.id.get());
    assert_eq!(
        Some(calls[0].files[0].url.as_str()),
        material.ocr_text_url.as_deref()
    );
    assert_eq!(calls[0].provider, "deepseek");
    assert_eq!(calls[0].model.as_deref(), Some("deepseek-chat"));
    assert_eq!(calls[0].prompt_text, "Extract people and organizations");

    let project = Project::find_by_id(fixture.project.id, pool).await.unwrap();
    assert_eq!(project.extract_config, Some(json!({"chunk_size": 800})));
    assert_eq!(project.project_progress, 3);

    let subscription = UserSubscription::find_by_user(fixture.user_id, pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscription.words_used, 12);

    eventually(|| async { (!deps.bridge.is_connected(&remote_id)).then_some(()) }).await;
}

#[test_context(TestHarness)]
#[tokio::test]
async fn ocr_task_sends_source_documents(ctx: &TestHarness) {
    let pool = &ctx.db_pool;
    let fixture = create_project(pool).await.unwrap();
    let material = create_material(pool, &fixture, "scan").await.unwrap();

    let mock = MockExtractionService::new().with_job_prefix(&unique_prefix());
    let remote_id = mock.job_id(1);
    let mock = mock.with_open_stream(&remote_id, &[]);
    let (deps, extraction) = deps_with(ctx, mock, MockBlobStore::new());

    submit_task(submit_request(&fixture, "ocr", &[&material]), &deps)
        .await
        .unwrap();

    assert_eq!(extraction.create_calls()[0].files[0].url, material.url);
    let project = Project::find_by_id(fixture.project.id, pool).await.unwrap();
    assert!(project.extract_config.is_none());

    deps.bridge.stop_all();
}

#[test_context(TestHarness)]
#[tokio::test]
async fn rejected_submission_fails_task(ctx: &TestHarness) {
    let pool = &ctx.db_pool;
    let fixture = create_project(pool).await.unwrap();
    let material = create_material(pool, &fixture, "scan").await.unwrap();

    let mock = MockExtractionService::new().with_create_error(503, "service overloaded");
    let (deps, _) = deps_with(ctx, mock, MockBlobStore::new());

    let err = submit_task(submit_request(&fixture, "extract", &[&material]), &deps)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TaskError::Remote(ExtractionError::Api { status: 503, .. })
    ));

    let (tasks, total) = Task::list(
        &TaskFilter {
            project_id: Some(fixture.project.id),
            pipeline_id: None,
        },
        &PageArgs::default().validate().unwrap(),
        pool,
    )
    .await
    .unwrap();
    assert_eq!(total, 1);
    assert_eq!(tasks[0].status().unwrap(), TaskStatus::Failed);
    assert!(tasks[0].finish_time.is_some());
    assert!(tasks[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("service overloaded"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn invalid_submission_creates_nothing(ctx: &TestHarness) {
    let pool = &ctx.db_pool;
    let fixture = create_project(pool).await.unwrap();
    let material = create_material(pool, &fixture, "scan").await.unwrap();
    let (deps, extraction) = deps_with(ctx, MockExtractionService::new(), MockBlobStore::new());

    let err = submit_task(submit_request(&fixture, "translate", &[&material]), &deps)
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::Validation(_)));
    assert!(extraction.create_calls().is_empty());

    let project = Project::find_by_id(fixture.project.id, pool).await.unwrap();
    assert!(project.extract_config.is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn remote_failure_frame_fails_task(ctx: &TestHarness) {
    let pool = &ctx.db_pool;
    let fixture = create_project(pool).await.unwrap();
    let material = create_material(pool, &fixture, "scan").await.unwrap();

    let mock = MockExtractionService::new().with_job_prefix(&unique_prefix());
    let remote_id = mock.job_id(1);
    let mock = mock.with_open_stream(
        &remote_id,
        &[
            &data(json!({"task_id": remote_id, "status": "processing"})),
            &data(json!({"task_id": remote_id, "status": "failed", "message": "failed", "error": "model timeout"})),
        ],
    );
    let (deps, _) = deps_with(ctx, mock, MockBlobStore::new());

    let task = submit_task(submit_request(&fixture, "graph", &[&material]), &deps)
        .await
        .unwrap();

    let failed = wait_for_status(pool, task.id, TaskStatus::Failed).await;
    assert_eq!(failed.error_message.as_deref(), Some("model timeout"));
    assert!(failed.finish_time.is_some());

    // The terminal frame closes the connection even though the stream stays open.
    eventually(|| async { (!deps.bridge.is_connected(&remote_id)).then_some(()) }).await;
}

#[test_context(TestHarness)]
#[tokio::test]
async fn cancel_stops_stream_and_fails_task(ctx: &TestHarness) {
    let pool = &ctx.db_pool;
    let fixture = create_project(pool).await.unwrap();
    let material = create_material(pool, &fixture, "scan").await.unwrap();

    let mock = MockExtractionService::new().with_job_prefix(&unique_prefix());
    let remote_id = mock.job_id(1);
    let mock = mock.with_open_stream(
        &remote_id,
        &[&data(json!({"task_id": remote_id, "status": "processing"}))],
    );
    let (deps, extraction) = deps_with(ctx, mock, MockBlobStore::new());

    let task = submit_task(submit_request(&fixture, "extract", &[&material]), &deps)
        .await
        .unwrap();
    wait_for_status(pool, task.id, TaskStatus::Processing).await;
    assert!(deps.bridge.is_connected(&remote_id));

    let second = deps.bridge.open_stream(&remote_id, task.id).await;
    assert!(matches!(second, Err(BridgeError::AlreadyConnected(id)) if id == remote_id));

    let cancelled = cancel_task(task.id, &deps).await.unwrap();
    assert_eq!(cancelled.status().unwrap(), TaskStatus::Failed);
    assert_eq!(cancelled.error_message.as_deref(), Some("cancelled"));
    assert_eq!(extraction.cancel_calls(), vec![remote_id.clone()]);
    assert!(!deps.bridge.is_connected(&remote_id));

    let again = cancel_task(task.id, &deps).await;
    assert!(matches!(again, Err(TaskError::Validation(_))));
}
