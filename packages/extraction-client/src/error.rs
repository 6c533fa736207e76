//! Error types for the extraction service client.

use thiserror::Error;

/// Result type for extraction client operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Extraction service client errors.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Configuration error (missing base URL, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection refused, reset, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status from the extraction service, with the raw body
    #[error("Extraction service returned {status}: {body}")]
    Api { status: u16, body: String },

    /// Response body did not match the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// A `data:` frame on the status stream was not valid JSON
    #[error("Stream decode error: {message} (data: {data})")]
    Decode { message: String, data: String },
}

impl ExtractionError {
    /// Upstream HTTP status, when the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ExtractionError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for failures talking to the service (as opposed to local decode errors).
    pub fn is_remote(&self) -> bool {
        matches!(self, ExtractionError::Api { .. } | ExtractionError::Network(_))
    }
}

impl From<reqwest::Error> for ExtractionError {
    fn from(e: reqwest::Error) -> Self {
        ExtractionError::Network(e.to_string())
    }
}
