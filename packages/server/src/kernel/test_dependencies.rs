// TestDependencies - mock implementations for testing
//
// Provides mock services that can be injected into ServerDeps for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use extraction_client::{
    CreateJobRequest, CreateJobResponse, ExtractionError, GenPromptRequest, GenPromptResponse,
    RemoteTaskStatus, TaskStatusStream,
};
use futures::StreamExt;
use sqlx::PgPool;

use super::{BaseBlobStore, BaseExtractionService, ServerDeps};
use crate::common::{TaskId, UserId};
use crate::config::LlmSettings;
use crate::domains::billing::QuotaEnforcer;
use crate::domains::bridge::{CompletionOutcome, StatusSink};

// =============================================================================
// Mock Extraction Service
// =============================================================================

struct ScriptedStream {
    lines: Vec<String>,
    keep_open: bool,
}

pub struct MockExtractionService {
    create_errors: Arc<Mutex<VecDeque<(u16, String)>>>,
    create_calls: Arc<Mutex<Vec<CreateJobRequest>>>,
    cancel_calls: Arc<Mutex<Vec<String>>>,
    statuses: Arc<Mutex<HashMap<String, RemoteTaskStatus>>>,
    streams: Arc<Mutex<HashMap<String, ScriptedStream>>>,
    job_prefix: String,
    next_job: Arc<AtomicUsize>,
    healthy: Arc<AtomicBool>,
}

impl MockExtractionService {
    pub fn new() -> Self {
        Self {
            create_errors: Arc::new(Mutex::new(VecDeque::new())),
            create_calls: Arc::new(Mutex::new(Vec::new())),
            cancel_calls: Arc::new(Mutex::new(Vec::new())),
            statuses: Arc::new(Mutex::new(HashMap::new())),
            streams: Arc::new(Mutex::new(HashMap::new())),
            job_prefix: "remote".to_string(),
            next_job: Arc::new(AtomicUsize::new(1)),
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Script a stream that ends after `lines`
    pub fn with_stream(self, remote_id: &str, lines: &[&str]) -> Self {
        self.script(remote_id, lines, false);
        self
    }

    /// Script a stream that stays open after `lines`
    pub fn with_open_stream(self, remote_id: &str, lines: &[&str]) -> Self {
        self.script(remote_id, lines, true);
        self
    }

    /// Created jobs get ids `{prefix}-1`, `{prefix}-2`, ...
    pub fn with_job_prefix(mut self, prefix: &str) -> Self {
        self.job_prefix = prefix.to_string();
        self
    }

    /// Id the n-th created job will get (1-based).
    pub fn job_id(&self, n: usize) -> String {
        format!("{}-{}", self.job_prefix, n)
    }

    /// Make the next `create_job` call fail with the given HTTP status
    pub fn with_create_error(self, status: u16, body: &str) -> Self {
        self.create_errors
            .lock()
            .unwrap()
            .push_back((status, body.to_string()));
        self
    }

    pub fn with_status(self, status: RemoteTaskStatus) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(status.task_id.clone(), status);
        self
    }

    pub fn unhealthy(self) -> Self {
        self.healthy.store(false, Ordering::SeqCst);
        self
    }

    /// Script a stream for a job created later (see [`job_id`](Self::job_id))
    pub fn script(&self, remote_id: &str, lines: &[&str], keep_open: bool) {
        self.streams.lock().unwrap().insert(
            remote_id.to_string(),
            ScriptedStream {
                lines: lines.iter().map(|l| l.to_string()).collect(),
                keep_open,
            },
        );
    }

    pub fn create_calls(&self) -> Vec<CreateJobRequest> {
        self.create_calls.lock().unwrap().clone()
    }

    pub fn cancel_calls(&self) -> Vec<String> {
        self.cancel_calls.lock().unwrap().clone()
    }
}

impl Default for MockExtractionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseExtractionService for MockExtractionService {
    async fn create_job(
        &self,
        request: &CreateJobRequest,
    ) -> Result<CreateJobResponse, ExtractionError> {
        self.create_calls.lock().unwrap().push(request.clone());

        if let Some((status, body)) = self.create_errors.lock().unwrap().pop_front() {
            return Err(ExtractionError::Api { status, body });
        }

        let n = self.next_job.fetch_add(1, Ordering::SeqCst);
        Ok(CreateJobResponse {
            task_id: self.job_id(n),
            status: "pending".to_string(),
            message: "Task created".to_string(),
        })
    }

    async fn get_status(&self, remote_id: &str) -> Result<RemoteTaskStatus, ExtractionError> {
        self.statuses
            .lock()
            .unwrap()
            .get(remote_id)
            .cloned()
            .ok_or_else(|| ExtractionError::Api {
                status: 404,
                body: format!("task {} not found", remote_id),
            })
    }

    async fn cancel_job(&self, remote_id: &str) -> Result<(), ExtractionError> {
        self.cancel_calls.lock().unwrap().push(remote_id.to_string());
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ExtractionError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ExtractionError::Network("connection refused".to_string()))
        }
    }

    async fn gen_prompt(
        &self,
        request: &GenPromptRequest,
    ) -> Result<GenPromptResponse, ExtractionError> {
        Ok(GenPromptResponse {
            prompt: format!("Extract entities defined in {}", request.schema_url),
            schema_url: Some(request.schema_url.clone()),
            target_domain: request.target_domain.clone(),
            priority_extractions: request.priority_extractions.clone(),
            error: None,
            message: None,
        })
    }

    async fn open_status_stream(
        &self,
        remote_id: &str,
    ) -> Result<TaskStatusStream, ExtractionError> {
        let script = self
            .streams
            .lock()
            .unwrap()
            .remove(remote_id)
            .ok_or_else(|| ExtractionError::Api {
                status: 404,
                body: format!("no stream for {}", remote_id),
            })?;

        let chunks: Vec<Result<Bytes, reqwest::Error>> = script
            .lines
            .into_iter()
            .map(|line| Ok(Bytes::from(format!("{}\n", line))))
            .collect();
        let frames = futures::stream::iter(chunks);

        if script.keep_open {
            Ok(TaskStatusStream::from_byte_stream(
                frames.chain(futures::stream::pending()),
            ))
        } else {
            Ok(TaskStatusStream::from_byte_stream(frames))
        }
    }
}

// =============================================================================
// Mock Blob Store
// =============================================================================

/// A blob written through the mock store
#[derive(Debug, Clone)]
pub struct SavedBlob {
    pub owner: UserId,
    pub file_name: String,
    pub content: String,
    pub location: String,
}

pub struct MockBlobStore {
    files: Arc<Mutex<HashMap<String, String>>>,
    saved: Arc<Mutex<Vec<SavedBlob>>>,
    failing_prefixes: Arc<Mutex<Vec<String>>>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            saved: Arc::new(Mutex::new(Vec::new())),
            failing_prefixes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make `content` readable at `location`
    pub fn with_file(self, location: &str, content: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(location.to_string(), content.to_string());
        self
    }

    /// Fail every save whose file name starts with `prefix`
    pub fn failing_saves(self, prefix: &str) -> Self {
        self.failing_prefixes
            .lock()
            .unwrap()
            .push(prefix.to_string());
        self
    }

    pub fn saved(&self) -> Vec<SavedBlob> {
        self.saved.lock().unwrap().clone()
    }

    pub fn saved_with_prefix(&self, prefix: &str) -> Vec<SavedBlob> {
        self.saved()
            .into_iter()
            .filter(|blob| blob.file_name.starts_with(prefix))
            .collect()
    }
}

impl Default for MockBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseBlobStore for MockBlobStore {
    async fn fetch_text(&self, location: &str) -> Result<String> {
        self.files
            .lock()
            .unwrap()
            .get(location)
            .cloned()
            .ok_or_else(|| anyhow!("No such blob: {}", location))
    }

    async fn save_json(&self, owner: UserId, file_name: &str, content: &str) -> Result<String> {
        let failing = self
            .failing_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| file_name.starts_with(prefix.as_str()));
        if failing {
            return Err(anyhow!("Simulated save failure for {}", file_name));
        }

        let location = format!("mock://{}/{}.json", owner, file_name);
        self.files
            .lock()
            .unwrap()
            .insert(location.clone(), content.to_string());
        self.saved.lock().unwrap().push(SavedBlob {
            owner,
            file_name: file_name.to_string(),
            content: content.to_string(),
            location: location.clone(),
        });
        Ok(location)
    }
}

// =============================================================================
// Recording Status Sink
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Processing(TaskId),
    Complete(TaskId),
    Fail(TaskId, String),
}

/// In-memory sink that records every write the bridge makes
pub struct RecordingStatusSink {
    calls: Arc<Mutex<Vec<SinkCall>>>,
    panic_on_processing: bool,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            panic_on_processing: false,
        }
    }

    pub fn panicking_on_processing(mut self) -> Self {
        self.panic_on_processing = true;
        self
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for RecordingStatusSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusSink for RecordingStatusSink {
    async fn mark_processing(&self, task_id: TaskId) -> Result<bool> {
        if self.panic_on_processing {
            panic!("sink exploded while marking task {} processing", task_id);
        }
        self.calls.lock().unwrap().push(SinkCall::Processing(task_id));
        Ok(true)
    }

    async fn complete(
        &self,
        task_id: TaskId,
        _frame: &RemoteTaskStatus,
    ) -> Result<CompletionOutcome> {
        self.calls.lock().unwrap().push(SinkCall::Complete(task_id));
        Ok(CompletionOutcome::Completed)
    }

    async fn fail(&self, task_id: TaskId, reason: &str) -> Result<bool> {
        self.calls
            .lock()
            .unwrap()
            .push(SinkCall::Fail(task_id, reason.to_string()));
        Ok(true)
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

pub struct TestDependencies {
    pub extraction: Arc<MockExtractionService>,
    pub blob_store: Arc<MockBlobStore>,
    pub quota: QuotaEnforcer,
    pub llm: LlmSettings,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            extraction: Arc::new(MockExtractionService::new()),
            blob_store: Arc::new(MockBlobStore::new()),
            quota: QuotaEnforcer::default(),
            llm: LlmSettings {
                provider: "deepseek".to_string(),
                model: Some("deepseek-chat".to_string()),
                api_key: "sk-test".to_string(),
                base_url: None,
            },
        }
    }

    /// Set a mock extraction service
    pub fn mock_extraction(mut self, service: MockExtractionService) -> Self {
        self.extraction = Arc::new(service);
        self
    }

    /// Set a mock blob store
    pub fn mock_blob_store(mut self, store: MockBlobStore) -> Self {
        self.blob_store = Arc::new(store);
        self
    }

    pub fn quota(mut self, quota: QuotaEnforcer) -> Self {
        self.quota = quota;
        self
    }

    /// Convert into ServerDeps for testing
    pub fn into_server_deps(self, db_pool: PgPool) -> ServerDeps {
        ServerDeps::new(
            db_pool,
            self.extraction,
            self.blob_store,
            self.quota,
            self.llm,
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
