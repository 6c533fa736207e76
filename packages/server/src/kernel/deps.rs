//! Server dependencies (using traits for testability)
//!
//! This module provides the central dependency container used by the HTTP
//! handlers and task activities. External services sit behind traits so tests
//! can swap in mocks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use extraction_client::{
    CreateJobRequest, CreateJobResponse, ExtractionClient, ExtractionError, GenPromptRequest,
    GenPromptResponse, RemoteTaskStatus, TaskStatusStream,
};
use sqlx::PgPool;

use crate::config::LlmSettings;
use crate::domains::billing::QuotaEnforcer;
use crate::domains::bridge::{BridgeManager, TaskStatusWriter};
use crate::kernel::{BaseBlobStore, BaseExtractionService, UserChannels};

// =============================================================================
// ExtractionClient Adapter (implements BaseExtractionService trait)
// =============================================================================

/// Wrapper around ExtractionClient that implements BaseExtractionService trait
pub struct ExtractionServiceAdapter(pub ExtractionClient);

impl ExtractionServiceAdapter {
    pub fn new(client: ExtractionClient) -> Self {
        Self(client)
    }
}

#[async_trait]
impl BaseExtractionService for ExtractionServiceAdapter {
    async fn create_job(
        &self,
        request: &CreateJobRequest,
    ) -> Result<CreateJobResponse, ExtractionError> {
        self.0.create_job(request).await
    }

    async fn get_status(&self, remote_id: &str) -> Result<RemoteTaskStatus, ExtractionError> {
        self.0.get_status(remote_id).await
    }

    async fn cancel_job(&self, remote_id: &str) -> Result<(), ExtractionError> {
        self.0.cancel_job(remote_id).await
    }

    async fn health_check(&self) -> Result<(), ExtractionError> {
        self.0.health_check().await
    }

    async fn gen_prompt(
        &self,
        request: &GenPromptRequest,
    ) -> Result<GenPromptResponse, ExtractionError> {
        self.0.gen_prompt(request).await
    }

    async fn open_status_stream(
        &self,
        remote_id: &str,
    ) -> Result<TaskStatusStream, ExtractionError> {
        self.0.open_status_stream(remote_id).await
    }
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Server dependencies shared by handlers and activities
#[derive(Clone)]
pub struct ServerDeps {
    pub db_pool: PgPool,
    pub extraction: Arc<dyn BaseExtractionService>,
    pub blob_store: Arc<dyn BaseBlobStore>,
    /// Live per-user notification channels (SSE)
    pub user_channels: UserChannels,
    /// One status stream per in-flight remote job
    pub bridge: BridgeManager,
    /// Default LLM credentials forwarded with each job
    pub llm: LlmSettings,
}

impl ServerDeps {
    /// Wire the bridge to a Postgres status writer sharing these dependencies
    pub fn new(
        db_pool: PgPool,
        extraction: Arc<dyn BaseExtractionService>,
        blob_store: Arc<dyn BaseBlobStore>,
        quota: QuotaEnforcer,
        llm: LlmSettings,
    ) -> Self {
        let user_channels = UserChannels::new();
        let writer = Arc::new(TaskStatusWriter::new(
            db_pool.clone(),
            blob_store.clone(),
            quota,
            user_channels.clone(),
        ));
        let bridge = BridgeManager::new(extraction.clone(), writer);

        Self {
            db_pool,
            extraction,
            blob_store,
            user_channels,
            bridge,
            llm,
        }
    }

    pub fn with_stream_deadline(mut self, deadline: Duration) -> Self {
        self.bridge = self.bridge.with_deadline(deadline);
        self
    }
}
