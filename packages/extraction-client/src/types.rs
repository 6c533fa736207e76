//! Wire types for the extraction service API.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Job submission
// =============================================================================

/// A source document handed to the extraction service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobFile {
    pub material_id: i64,
    pub url: String,
}

/// `POST /api/v1/tasks` request body.
#[derive(Debug, Clone, Serialize)]
pub struct CreateJobRequest {
    pub files: Vec<JobFile>,
    pub prompt_text: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// `201 Created` response for a submitted job.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobResponse {
    pub task_id: String,
    pub status: String,
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// Job status
// =============================================================================

/// Status vocabulary used by the extraction service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteJobState {
    Created,
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Unknown(String),
}

impl RemoteJobState {
    /// Completed, failed and cancelled jobs never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemoteJobState::Completed | RemoteJobState::Failed | RemoteJobState::Cancelled
        )
    }
}

impl From<&str> for RemoteJobState {
    fn from(s: &str) -> Self {
        match s {
            "created" => RemoteJobState::Created,
            "pending" => RemoteJobState::Pending,
            "processing" => RemoteJobState::Processing,
            "completed" => RemoteJobState::Completed,
            "failed" => RemoteJobState::Failed,
            "cancelled" => RemoteJobState::Cancelled,
            other => RemoteJobState::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for RemoteJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteJobState::Created => write!(f, "created"),
            RemoteJobState::Pending => write!(f, "pending"),
            RemoteJobState::Processing => write!(f, "processing"),
            RemoteJobState::Completed => write!(f, "completed"),
            RemoteJobState::Failed => write!(f, "failed"),
            RemoteJobState::Cancelled => write!(f, "cancelled"),
            RemoteJobState::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// Job status as returned by `GET /api/v1/tasks/{id}` and pushed on the stream.
///
/// Heartbeat frames carry only `type` and `timestamp`, so everything else
/// has to tolerate absence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteTaskStatus {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<TaskFileResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub frame_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl RemoteTaskStatus {
    pub fn state(&self) -> RemoteJobState {
        RemoteJobState::from(self.status.as_str())
    }

    pub fn is_heartbeat(&self) -> bool {
        self.frame_type.as_deref() == Some("heartbeat")
    }

    /// Per-material results (empty until the job has produced output).
    pub fn results(&self) -> &[TaskFileResult] {
        self.results.as_deref().unwrap_or(&[])
    }

    /// Error text for a failed job: `error` if set, otherwise `message`.
    pub fn failure_reason(&self) -> String {
        self.error
            .as_deref()
            .filter(|e| !e.is_empty())
            .or(self.message.as_deref())
            .unwrap_or_default()
            .to_string()
    }
}

/// Output of one material within a job.
///
/// Files that failed before they were matched to a material carry a null
/// `material_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFileResult {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub material_id: Option<i64>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub triples_count: i64,
    #[serde(default)]
    pub output_files: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskFileResult {
    pub fn succeeded(&self) -> bool {
        self.status == "success"
    }

    /// Path of the output file of the given kind (e.g. `jsonl`).
    pub fn output_file(&self, kind: &str) -> Option<&str> {
        self.output_files
            .as_ref()
            .and_then(|files| files.get(kind))
            .map(String::as_str)
    }
}

// =============================================================================
// Prompt generation
// =============================================================================

/// `POST /api/v1/genprompt` request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenPromptRequest {
    pub schema_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_text_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_xlsx_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dictionary_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_extractions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_requirements: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_instruction: Option<String>,
}

/// Generated extraction prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenPromptResponse {
    pub prompt: String,
    #[serde(default)]
    pub schema_url: Option<String>,
    #[serde(default)]
    pub target_domain: Option<String>,
    #[serde(default)]
    pub priority_extractions: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_frame_deserializes_without_status() {
        let frame: RemoteTaskStatus =
            serde_json::from_str(r#"{"type":"heartbeat","timestamp":"2024-05-01T10:00:00"}"#)
                .unwrap();
        assert!(frame.is_heartbeat());
        assert_eq!(frame.state(), RemoteJobState::Unknown(String::new()));
        assert!(frame.results().is_empty());
    }

    #[test]
    fn test_null_results_and_output_files() {
        let frame: RemoteTaskStatus = serde_json::from_str(
            r#"{"task_id":"t1","status":"completed","results":[{"material_id":3,"status":"success","output_files":null}]}"#,
        )
        .unwrap();
        assert_eq!(frame.state(), RemoteJobState::Completed);
        assert_eq!(frame.results().len(), 1);
        assert!(frame.results()[0].succeeded());
        assert_eq!(frame.results()[0].output_file("jsonl"), None);
    }

    #[test]
    fn test_result_without_material_id_keeps_frame_decodable() {
        let frame: RemoteTaskStatus = serde_json::from_str(
            r#"{"task_id":"t2","status":"completed","results":[
                {"file_name":"lost.pdf","material_id":null,"status":"failed","error":"download failed"},
                {"file_name":"ok.pdf","status":"failed"},
                {"file_name":"good.pdf","material_id":2,"status":"success","output_files":{"jsonl":"out/2.jsonl"}}
            ]}"#,
        )
        .unwrap();

        let results = frame.results();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].material_id, None);
        assert_eq!(results[1].material_id, None);
        assert_eq!(results[2].material_id, Some(2));
        assert!(results[2].succeeded());
        assert_eq!(results[2].output_file("jsonl"), Some("out/2.jsonl"));
    }

    #[test]
    fn test_failure_reason_prefers_error() {
        let status = RemoteTaskStatus {
            status: "failed".into(),
            error: Some("model timeout".into()),
            message: Some("job failed".into()),
            ..Default::default()
        };
        assert_eq!(status.failure_reason(), "model timeout");

        let status = RemoteTaskStatus {
            status: "failed".into(),
            error: Some(String::new()),
            message: Some("job failed".into()),
            ..Default::default()
        };
        assert_eq!(status.failure_reason(), "job failed");
    }

    #[test]
    fn test_create_request_omits_absent_optionals() {
        let request = CreateJobRequest {
            files: vec![JobFile {
                material_id: 7,
                url: "https://files.example/a.docx".into(),
            }],
            prompt_text: "extract".into(),
            provider: "deepseek".into(),
            model: None,
            api_key: "sk-test".into(),
            base_url: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("model").is_none());
        assert!(json.get("base_url").is_none());
        assert_eq!(json["files"][0]["material_id"], 7);
    }
}
