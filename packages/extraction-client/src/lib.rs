//! REST and event-stream client for the triple-extraction service.
//!
//! A small client with no platform logic: it submits extraction jobs, polls
//! and cancels them, and opens the per-job status stream. Callers own the
//! client value and pass it wherever it is needed.
//!
//! # Example
//!
//! ```rust,ignore
//! use extraction_client::{CreateJobRequest, ExtractionClient, JobFile};
//!
//! let client = ExtractionClient::new("http://localhost:8000");
//!
//! let job = client.create_job(&CreateJobRequest {
//!     files: vec![JobFile { material_id: 1, url: "https://files.example/a.pdf".into() }],
//!     prompt_text: "Extract people and organizations".into(),
//!     provider: "deepseek".into(),
//!     model: Some("deepseek-chat".into()),
//!     api_key: api_key.clone(),
//!     base_url: None,
//! }).await?;
//!
//! let mut frames = client.open_status_stream(&job.task_id).await?;
//! while let Some(frame) = frames.next().await {
//!     println!("{:?}", frame?.state());
//! }
//! ```

pub mod error;
pub mod streaming;
pub mod types;

pub use error::{ExtractionError, Result};
pub use streaming::TaskStatusStream;
pub use types::*;

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{header, Client, StatusCode};
use tracing::{debug, info, warn};

lazy_static! {
    static ref UNICODE_ESCAPE: Regex = Regex::new(r"\\u([0-9a-fA-F]{4})").unwrap();
}

/// Client for the extraction service.
#[derive(Clone)]
pub struct ExtractionClient {
    http_client: Client,
    base_url: String,
}

impl ExtractionClient {
    /// Create a client for the service at `base_url`.
    ///
    /// The underlying HTTP client has no overall timeout: status streams stay
    /// open for as long as the job runs, so deadlines belong to the caller.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create from environment variable `EXTRACTION_SERVICE_URL`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("EXTRACTION_SERVICE_URL")
            .map_err(|_| ExtractionError::Config("EXTRACTION_SERVICE_URL not set".into()))?;
        Ok(Self::new(base_url))
    }

    /// Use a preconfigured HTTP client (proxies, TLS settings).
    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.http_client = http_client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit an extraction job. The service must answer `201 Created`.
    pub async fn create_job(&self, request: &CreateJobRequest) -> Result<CreateJobResponse> {
        let response = self
            .http_client
            .post(format!("{}/api/v1/tasks", self.base_url))
            .header(header::CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Extraction job submission failed");
                ExtractionError::Network(e.to_string())
            })?;

        let response = expect_status(response, StatusCode::CREATED).await?;

        let created: CreateJobResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(e.to_string()))?;

        info!(
            remote_id = %created.task_id,
            files = request.files.len(),
            "Extraction job created"
        );
        Ok(created)
    }

    /// Poll the current status of a job.
    pub async fn get_status(&self, remote_id: &str) -> Result<RemoteTaskStatus> {
        let response = self
            .http_client
            .get(format!("{}/api/v1/tasks/{}", self.base_url, remote_id))
            .send()
            .await?;

        let response = expect_status(response, StatusCode::OK).await?;

        response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(e.to_string()))
    }

    /// Ask the service to cancel a job.
    pub async fn cancel_job(&self, remote_id: &str) -> Result<()> {
        let response = self
            .http_client
            .delete(format!("{}/api/v1/tasks/{}", self.base_url, remote_id))
            .send()
            .await?;

        expect_status(response, StatusCode::OK).await?;

        info!(remote_id, "Extraction job cancelled");
        Ok(())
    }

    /// Liveness probe.
    pub async fn health_check(&self) -> Result<()> {
        let response = self
            .http_client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        expect_status(response, StatusCode::OK).await?;
        Ok(())
    }

    /// Generate an extraction prompt from a schema and samples.
    ///
    /// The service reports errors as JSON with `\uXXXX` escapes; they are
    /// decoded so the message is readable.
    pub async fn gen_prompt(&self, request: &GenPromptRequest) -> Result<GenPromptResponse> {
        let url = format!("{}/api/v1/genprompt", self.base_url);
        debug!(url = %url, "Requesting prompt generation");

        let response = self
            .http_client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api {
                status: status.as_u16(),
                body: decode_unicode_escapes(&body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(e.to_string()))
    }

    /// Open the status event stream for a job.
    ///
    /// The request is bound to the returned stream; dropping the stream
    /// closes the connection.
    pub async fn open_status_stream(&self, remote_id: &str) -> Result<TaskStatusStream> {
        let response = self
            .http_client
            .get(format!("{}/api/v1/tasks/{}/stream", self.base_url, remote_id))
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| {
                warn!(remote_id, error = %e, "Status stream request failed");
                ExtractionError::Network(e.to_string())
            })?;

        let response = expect_status(response, StatusCode::OK).await?;

        debug!(remote_id, "Status stream opened");
        Ok(TaskStatusStream::from_byte_stream(response.bytes_stream()))
    }
}

/// Turn any status other than `expected` into `ExtractionError::Api` with the raw body.
async fn expect_status(
    response: reqwest::Response,
    expected: StatusCode,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status == expected {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = %status, body = %body, "Extraction service error");
    Err(ExtractionError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Replace `\uXXXX` escape sequences with the characters they encode.
pub fn decode_unicode_escapes(s: &str) -> String {
    UNICODE_ESCAPE
        .replace_all(s, |caps: &regex::Captures| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(|c| c.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
