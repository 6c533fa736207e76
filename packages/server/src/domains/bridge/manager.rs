//! Per-job status stream readers.
//!
//! `open_stream` reserves the job's slot, opens the remote event stream and
//! spawns one tokio task that applies frames in order until the job reaches a
//! terminal status, the stream ends, the deadline passes or the connection is
//! stopped. Whatever the reason, the connection is released exactly once.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use extraction_client::{ExtractionError, RemoteTaskStatus};
use futures::{FutureExt, Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::common::TaskId;
use crate::domains::bridge::registry::{BridgeConnection, ConnectionInfo, ConnectionRegistry};
use crate::domains::bridge::sink::{CompletionOutcome, StatusSink};
use crate::domains::bridge::translate::{translate, StatusUpdate};
use crate::domains::bridge::BridgeError;
use crate::kernel::BaseExtractionService;

pub const DEFAULT_STREAM_DEADLINE: Duration = Duration::from_secs(10 * 60);

/// Why a connection's read loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    Completed(CompletionOutcome),
    Failed,
    EndOfStream,
    Stopped,
    DeadlineExceeded,
}

#[derive(Clone)]
pub struct BridgeManager {
    registry: ConnectionRegistry,
    source: Arc<dyn BaseExtractionService>,
    sink: Arc<dyn StatusSink>,
    deadline: Duration,
}

impl BridgeManager {
    pub fn new(source: Arc<dyn BaseExtractionService>, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            source,
            sink,
            deadline: DEFAULT_STREAM_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Start following `remote_id` on behalf of `task_id`.
    pub async fn open_stream(&self, remote_id: &str, task_id: TaskId) -> Result<(), BridgeError> {
        let connection = self.registry.reserve(remote_id, task_id)?;

        let stream = match self.source.open_status_stream(remote_id).await {
            Ok(stream) => stream,
            Err(e) => {
                self.registry.release(&connection);
                warn!(remote_id, task_id = %task_id, error = %e, "Failed to open status stream");
                return Err(BridgeError::Connect(e));
            }
        };

        info!(remote_id, task_id = %task_id, "Status stream connected");

        let registry = self.registry.clone();
        let sink = self.sink.clone();
        let deadline = self.deadline;
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(run_connection(
                stream,
                task_id,
                &connection,
                sink.as_ref(),
                deadline,
            ))
            .catch_unwind()
            .await;

            let failure = match outcome {
                Ok(Ok(end)) => {
                    info!(remote_id = %connection.remote_id(), task_id = %task_id, end = ?end, "Status stream finished");
                    None
                }
                Ok(Err(e)) => {
                    error!(remote_id = %connection.remote_id(), task_id = %task_id, error = %e, "Status stream failed");
                    Some(format!("{:#}", e))
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(remote_id = %connection.remote_id(), task_id = %task_id, panic = %message, "Status stream reader panicked");
                    Some(format!("Status stream reader panicked: {}", message))
                }
            };

            if let Some(reason) = failure {
                if let Err(e) = sink.fail(task_id, &reason).await {
                    error!(task_id = %task_id, error = %e, "Failed to record stream failure");
                }
            }

            registry.release(&connection);
        });

        Ok(())
    }

    /// Stop following `remote_id`. Returns `false` if it was not connected.
    pub fn stop_stream(&self, remote_id: &str) -> bool {
        let stopped = self.registry.stop(remote_id);
        if stopped {
            info!(remote_id, "Status stream stopped");
        }
        stopped
    }

    /// Stop every connection (graceful shutdown).
    pub fn stop_all(&self) -> usize {
        let stopped = self.registry.stop_all();
        info!(count = stopped, "All status streams stopped");
        stopped
    }

    pub fn is_connected(&self, remote_id: &str) -> bool {
        self.registry.contains(remote_id)
    }

    pub fn active_connections(&self) -> Vec<ConnectionInfo> {
        self.registry.active()
    }
}

/// Read frames until the job is done or the connection has to stop.
///
/// Frames are applied one at a time; a terminal write finishes before this
/// returns.
pub async fn run_connection<S>(
    mut stream: S,
    task_id: TaskId,
    connection: &BridgeConnection,
    sink: &dyn StatusSink,
    deadline: Duration,
) -> Result<StreamEnd>
where
    S: Stream<Item = Result<RemoteTaskStatus, ExtractionError>> + Unpin,
{
    let expiry = tokio::time::sleep(deadline);
    tokio::pin!(expiry);

    loop {
        let next = tokio::select! {
            biased;
            _ = connection.closed() => return Ok(StreamEnd::Stopped),
            _ = &mut expiry => {
                warn!(remote_id = %connection.remote_id(), task_id = %task_id, "Status stream deadline exceeded");
                return Ok(StreamEnd::DeadlineExceeded);
            }
            next = stream.next() => next,
        };

        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(e.into()),
            None => {
                warn!(remote_id = %connection.remote_id(), task_id = %task_id, "Status stream ended before a terminal status");
                return Ok(StreamEnd::EndOfStream);
            }
        };

        match translate(&frame) {
            StatusUpdate::Ignore => {
                debug!(task_id = %task_id, status = %frame.status, heartbeat = frame.is_heartbeat(), "Frame ignored");
            }
            StatusUpdate::Processing => {
                if sink.mark_processing(task_id).await? {
                    info!(task_id = %task_id, "Task processing");
                }
            }
            StatusUpdate::Completed => {
                let outcome = sink.complete(task_id, &frame).await?;
                return Ok(StreamEnd::Completed(outcome));
            }
            StatusUpdate::Failed { reason } => {
                sink.fail(task_id, &reason).await?;
                info!(task_id = %task_id, reason = %reason, "Task failed remotely");
                return Ok(StreamEnd::Failed);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::{MockExtractionService, RecordingStatusSink, SinkCall};

    fn manager(
        source: Arc<MockExtractionService>,
        sink: Arc<RecordingStatusSink>,
    ) -> BridgeManager {
        BridgeManager::new(source, sink).with_deadline(Duration::from_secs(5))
    }

    async fn wait_until_released(manager: &BridgeManager, remote_id: &str) {
        for _ in 0..200 {
            if !manager.is_connected(remote_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("connection {} was never released", remote_id);
    }

    #[tokio::test]
    async fn test_frames_applied_in_order() {
        let source = Arc::new(MockExtractionService::new().with_stream(
            "job-1",
            &[
                r#"data: {"task_id":"job-1","status":"pending"}"#,
                r#"data: {"type":"heartbeat"}"#,
                r#"data: {"task_id":"job-1","status":"processing","progress":0.4}"#,
                r#"data: {"task_id":"job-1","status":"processing","progress":0.8}"#,
                r#"data: {"task_id":"job-1","status":"completed"}"#,
            ],
        ));
        let sink = Arc::new(RecordingStatusSink::new());
        let manager = manager(source, sink.clone());

        manager.open_stream("job-1", TaskId::new(1)).await.unwrap();
        wait_until_released(&manager, "job-1").await;

        assert_eq!(
            sink.calls(),
            vec![
                SinkCall::Processing(TaskId::new(1)),
                SinkCall::Processing(TaskId::new(1)),
                SinkCall::Complete(TaskId::new(1)),
            ]
        );
    }

    #[tokio::test]
    async fn test_second_open_is_rejected() {
        let source = Arc::new(
            MockExtractionService::new().with_open_stream("job-1", &[r#"data: {"type":"heartbeat"}"#]),
        );
        let sink = Arc::new(RecordingStatusSink::new());
        let manager = manager(source, sink.clone());

        manager.open_stream("job-1", TaskId::new(1)).await.unwrap();
        let err = manager.open_stream("job-1", TaskId::new(1)).await.unwrap_err();
        assert!(matches!(err, BridgeError::AlreadyConnected(_)));

        assert!(manager.stop_stream("job-1"));
        wait_until_released(&manager, "job-1").await;
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_heartbeats_keep_connection_open() {
        let source = Arc::new(MockExtractionService::new().with_open_stream(
            "job-1",
            &[
                r#"data: {"type":"heartbeat","timestamp":"2024-05-01T10:00:00"}"#,
                r#"data: {"type":"heartbeat","timestamp":"2024-05-01T10:00:30"}"#,
            ],
        ));
        let sink = Arc::new(RecordingStatusSink::new());
        let manager = manager(source, sink.clone());

        manager.open_stream("job-1", TaskId::new(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(manager.is_connected("job-1"));
        assert!(sink.calls().is_empty());
        assert_eq!(manager.stop_all(), 1);
    }

    #[tokio::test]
    async fn test_decode_error_marks_task_failed() {
        let source = Arc::new(MockExtractionService::new().with_stream(
            "job-1",
            &[r#"data: {"task_id":"job-1","status":"processing"}"#, "data: {oops"],
        ));
        let sink = Arc::new(RecordingStatusSink::new());
        let manager = manager(source, sink.clone());

        manager.open_stream("job-1", TaskId::new(7)).await.unwrap();
        wait_until_released(&manager, "job-1").await;

        let calls = sink.calls();
        assert_eq!(calls[0], SinkCall::Processing(TaskId::new(7)));
        match &calls[1] {
            SinkCall::Fail(id, reason) => {
                assert_eq!(*id, TaskId::new(7));
                assert!(reason.contains("Stream decode error"));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remote_cancel_becomes_failure() {
        let source = Arc::new(MockExtractionService::new().with_stream(
            "job-1",
            &[r#"data: {"task_id":"job-1","status":"cancelled"}"#],
        ));
        let sink = Arc::new(RecordingStatusSink::new());
        let manager = manager(source, sink.clone());

        manager.open_stream("job-1", TaskId::new(2)).await.unwrap();
        wait_until_released(&manager, "job-1").await;

        assert_eq!(
            sink.calls(),
            vec![SinkCall::Fail(TaskId::new(2), "cancelled".to_string())]
        );
    }

    #[tokio::test]
    async fn test_panic_is_contained_to_connection() {
        let source = Arc::new(MockExtractionService::new().with_stream(
            "job-1",
            &[r#"data: {"task_id":"job-1","status":"processing"}"#],
        ));
        let sink = Arc::new(RecordingStatusSink::new().panicking_on_processing());
        let manager = manager(source, sink.clone());

        manager.open_stream("job-1", TaskId::new(3)).await.unwrap();
        wait_until_released(&manager, "job-1").await;

        match sink.calls().last() {
            Some(SinkCall::Fail(id, reason)) => {
                assert_eq!(*id, TaskId::new(3));
                assert!(reason.contains("panicked"));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_failure_releases_slot() {
        let source = Arc::new(MockExtractionService::new());
        let sink = Arc::new(RecordingStatusSink::new());
        let manager = manager(source, sink);

        let err = manager.open_stream("missing", TaskId::new(1)).await.unwrap_err();
        assert!(matches!(err, BridgeError::Connect(_)));
        assert!(!manager.is_connected("missing"));
    }

    #[tokio::test]
    async fn test_deadline_tears_down_without_status_write() {
        let source = Arc::new(
            MockExtractionService::new().with_open_stream("job-1", &[r#"data: {"type":"heartbeat"}"#]),
        );
        let sink = Arc::new(RecordingStatusSink::new());
        let manager = BridgeManager::new(source, sink.clone())
            .with_deadline(Duration::from_millis(30));

        manager.open_stream("job-1", TaskId::new(1)).await.unwrap();
        wait_until_released(&manager, "job-1").await;
        assert!(sink.calls().is_empty());
    }
}
