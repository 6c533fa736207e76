//! Event-stream parser for job status updates.
//!
//! Converts a raw `reqwest` byte stream into `RemoteTaskStatus` values.
//! Handles partial lines and multi-byte characters split across chunks.
//! Heartbeat frames are passed through; callers decide whether to act on them.

use bytes::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::ExtractionError;
use crate::types::RemoteTaskStatus;

const DATA_PREFIX: &str = "data: ";

/// Stream adapter that converts raw event-stream bytes into status frames.
pub struct TaskStatusStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    buffer: Vec<u8>,
}

impl TaskStatusStream {
    /// Wrap any byte stream carrying `data: <json>` lines.
    pub fn from_byte_stream(
        byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            buffer: Vec::new(),
        }
    }
}

impl Stream for TaskStatusStream {
    type Item = Result<RemoteTaskStatus, ExtractionError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(frame) = try_parse_line(&mut this.buffer) {
                return Poll::Ready(Some(frame));
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.extend_from_slice(&bytes);
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(ExtractionError::Network(e.to_string()))));
                }
                Poll::Ready(None) => {
                    // A final frame may arrive without its trailing newline
                    if this.buffer.iter().all(u8::is_ascii_whitespace) {
                        return Poll::Ready(None);
                    }
                    this.buffer.push(b'\n');
                    if let Some(frame) = try_parse_line(&mut this.buffer) {
                        return Poll::Ready(Some(frame));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Try to extract and parse one complete `data:` line from the buffer.
/// Returns `None` if no complete data line is available yet.
fn try_parse_line(buffer: &mut Vec<u8>) -> Option<Result<RemoteTaskStatus, ExtractionError>> {
    loop {
        let newline_pos = buffer.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = buffer.drain(..=newline_pos).collect();
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();

        // Blank lines separate events
        if line.is_empty() {
            continue;
        }

        // Comments, `event:`, `id:` and `retry:` lines carry nothing we use
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() {
            continue;
        }

        return Some(
            serde_json::from_str::<RemoteTaskStatus>(data).map_err(|e| ExtractionError::Decode {
                message: e.to_string(),
                data: data.chars().take(200).collect(),
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RemoteJobState;
    use futures::StreamExt;

    fn make_sse_bytes(lines: &[&str]) -> Vec<Result<Bytes, reqwest::Error>> {
        lines
            .iter()
            .map(|line| Ok(Bytes::from(format!("{}\n", line))))
            .collect()
    }

    #[tokio::test]
    async fn test_parse_status_frames_in_order() {
        let data = make_sse_bytes(&[
            r#"data: {"task_id":"t1","status":"pending"}"#,
            "",
            r#"data: {"task_id":"t1","status":"processing","progress":0.5}"#,
            "",
            r#"data: {"task_id":"t1","status":"completed"}"#,
        ]);

        let mut stream = TaskStatusStream::from_byte_stream(futures::stream::iter(data));

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.state(), RemoteJobState::Pending);

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.state(), RemoteJobState::Processing);
        assert_eq!(second.progress, Some(0.5));

        let third = stream.next().await.unwrap().unwrap();
        assert_eq!(third.state(), RemoteJobState::Completed);

        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_skips_comments_and_unknown_prefixes() {
        let data = make_sse_bytes(&[
            ": keep-alive",
            "event: status",
            "id: 4",
            "data: ",
            r#"data: {"type":"heartbeat","timestamp":"2024-05-01T10:00:00"}"#,
            r#"data: {"task_id":"t1","status":"failed","error":"boom"}"#,
        ]);

        let mut stream = TaskStatusStream::from_byte_stream(futures::stream::iter(data));

        let heartbeat = stream.next().await.unwrap().unwrap();
        assert!(heartbeat.is_heartbeat());

        let failed = stream.next().await.unwrap().unwrap();
        assert_eq!(failed.state(), RemoteJobState::Failed);
        assert_eq!(failed.failure_reason(), "boom");
    }

    #[tokio::test]
    async fn test_frame_split_across_chunks() {
        // "处理" is multi-byte; split in the middle of a character
        let frame = "data: {\"task_id\":\"t1\",\"status\":\"processing\",\"message\":\"处理中\"}\n";
        let bytes = frame.as_bytes();
        let split = frame.find('处').unwrap() + 1;
        let chunks: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::copy_from_slice(&bytes[..split])),
            Ok(Bytes::copy_from_slice(&bytes[split..])),
        ];

        let mut stream = TaskStatusStream::from_byte_stream(futures::stream::iter(chunks));
        let status = stream.next().await.unwrap().unwrap();
        assert_eq!(status.message.as_deref(), Some("处理中"));
    }

    #[tokio::test]
    async fn test_malformed_frame_is_decode_error() {
        let data = make_sse_bytes(&["data: {not json"]);
        let mut stream = TaskStatusStream::from_byte_stream(futures::stream::iter(data));

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ExtractionError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_trailing_frame_without_newline() {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = vec![Ok(Bytes::from_static(
            br#"data: {"task_id":"t1","status":"cancelled"}"#,
        ))];
        let mut stream = TaskStatusStream::from_byte_stream(futures::stream::iter(chunks));

        let status = stream.next().await.unwrap().unwrap();
        assert_eq!(status.state(), RemoteJobState::Cancelled);
        assert!(stream.next().await.is_none());
    }
}
