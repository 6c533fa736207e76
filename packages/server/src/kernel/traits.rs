// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Business logic (quota accounting, materialization) lives in the domains and uses these traits.
//
// Naming convention: Base* for trait names (e.g., BaseExtractionService, BaseBlobStore)

use anyhow::Result;
use async_trait::async_trait;
use extraction_client::{
    CreateJobRequest, CreateJobResponse, ExtractionError, GenPromptRequest, GenPromptResponse,
    RemoteTaskStatus, TaskStatusStream,
};

use crate::common::UserId;

// =============================================================================
// Extraction Service Trait (Infrastructure - remote job execution)
// =============================================================================

#[async_trait]
pub trait BaseExtractionService: Send + Sync {
    /// Submit a job; the service answers `201` with its own job id
    async fn create_job(
        &self,
        request: &CreateJobRequest,
    ) -> Result<CreateJobResponse, ExtractionError>;

    /// One-shot status poll (diagnostics)
    async fn get_status(&self, remote_id: &str) -> Result<RemoteTaskStatus, ExtractionError>;

    async fn cancel_job(&self, remote_id: &str) -> Result<(), ExtractionError>;

    async fn health_check(&self) -> Result<(), ExtractionError>;

    async fn gen_prompt(
        &self,
        request: &GenPromptRequest,
    ) -> Result<GenPromptResponse, ExtractionError>;

    /// Open the live status event stream for a job
    async fn open_status_stream(&self, remote_id: &str)
        -> Result<TaskStatusStream, ExtractionError>;
}

// =============================================================================
// Blob Store Trait (Infrastructure - durable file storage)
// =============================================================================

#[async_trait]
pub trait BaseBlobStore: Send + Sync {
    /// Read a stored text file by location (path or URL)
    async fn fetch_text(&self, location: &str) -> Result<String>;

    /// Store a JSON document on behalf of a user, returning its location
    async fn save_json(&self, owner: UserId, file_name: &str, content: &str) -> Result<String>;
}
