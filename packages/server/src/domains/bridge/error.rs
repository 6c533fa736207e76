use extraction_client::ExtractionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Status stream for remote job {0} is already connected")]
    AlreadyConnected(String),

    #[error("Failed to open status stream: {0}")]
    Connect(#[from] ExtractionError),
}
