use extraction_client::{RemoteJobState, RemoteTaskStatus};

/// Local effect of one remote status frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Nothing to persist (heartbeats, created/pending, unknown statuses).
    Ignore,
    Processing,
    Completed,
    Failed { reason: String },
}

impl StatusUpdate {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusUpdate::Completed | StatusUpdate::Failed { .. })
    }
}

/// Map a remote frame onto the local task lifecycle.
pub fn translate(frame: &RemoteTaskStatus) -> StatusUpdate {
    if frame.is_heartbeat() {
        return StatusUpdate::Ignore;
    }

    match frame.state() {
        RemoteJobState::Created | RemoteJobState::Pending => StatusUpdate::Ignore,
        RemoteJobState::Processing => StatusUpdate::Processing,
        RemoteJobState::Completed => StatusUpdate::Completed,
        RemoteJobState::Failed => StatusUpdate::Failed {
            reason: frame.failure_reason(),
        },
        RemoteJobState::Cancelled => StatusUpdate::Failed {
            reason: "cancelled".to_string(),
        },
        RemoteJobState::Unknown(_) => StatusUpdate::Ignore,
    }
}
