//! Per-user live notification channels.
//!
//! Each user has at most one registered channel. Registering again replaces
//! the previous channel, whose stream then ends. Messages published while no
//! channel is registered are dropped.
//!
//! # Usage
//!
//! Producers (domain code):
//!   channels.publish(user_id, "quota warning");
//!
//! Consumers (SSE endpoint):
//!   let channel = channels.register(user_id);   // a `Stream<Item = String>`

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::common::UserId;

struct Registration {
    generation: u64,
    sender: mpsc::Sender<String>,
}

/// Registry of live user channels.
///
/// Thread-safe, cloneable.
#[derive(Clone)]
pub struct UserChannels {
    channels: Arc<Mutex<HashMap<UserId, Registration>>>,
    next_generation: Arc<AtomicU64>,
    capacity: usize,
}

impl UserChannels {
    /// Create a registry with default capacity (64 pending messages per user).
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(1)),
            capacity: capacity.max(1),
        }
    }

    /// Register a fresh channel for `user_id`, replacing any existing one.
    pub fn register(&self, user_id: UserId) -> UserChannel {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let replaced = self
            .lock()
            .insert(user_id, Registration { generation, sender })
            .is_some();
        if replaced {
            debug!(user_id = %user_id, "Replaced existing user channel");
        }

        UserChannel {
            user_id,
            generation,
            receiver: ReceiverStream::new(receiver),
            channels: self.clone(),
        }
    }

    /// Remove the registration for `user_id` if it is still `generation`.
    pub fn unregister(&self, user_id: UserId, generation: u64) -> bool {
        let mut channels = self.lock();
        match channels.get(&user_id) {
            Some(current) if current.generation == generation => {
                channels.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Deliver a message to the user's live channel.
    ///
    /// Returns `false` when the message was dropped (no channel, or the
    /// channel is full or closed).
    pub fn publish(&self, user_id: UserId, message: impl Into<String>) -> bool {
        let sender = match self.lock().get(&user_id) {
            Some(registration) => registration.sender.clone(),
            None => {
                debug!(user_id = %user_id, "No live channel, dropping message");
                return false;
            }
        };

        match sender.try_send(message.into()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(user_id = %user_id, "User channel full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Serialize and publish a JSON notice.
    pub fn publish_json(&self, user_id: UserId, value: &serde_json::Value) -> bool {
        self.publish(user_id, value.to_string())
    }

    pub fn is_connected(&self, user_id: UserId) -> bool {
        self.lock().contains_key(&user_id)
    }

    pub fn connected_users(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, Registration>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for UserChannels {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered channel; unregisters itself when dropped.
pub struct UserChannel {
    user_id: UserId,
    generation: u64,
    receiver: ReceiverStream<String>,
    channels: UserChannels,
}

impl UserChannel {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.next().await
    }
}

impl Stream for UserChannel {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        Pin::new(&mut self.get_mut().receiver).poll_next(cx)
    }
}

impl Drop for UserChannel {
    fn drop(&mut self) {
        if self.channels.unregister(self.user_id, self.generation) {
            debug!(user_id = %self.user_id, "User channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_publish_reaches_registered_channel() {
        let channels = UserChannels::new();
        let mut channel = channels.register(UserId::new(1));

        assert!(channels.publish(UserId::new(1), "hello"));
        assert_eq!(channel.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_publish_without_channel_is_dropped() {
        let channels = UserChannels::new();
        assert!(!channels.publish(UserId::new(404), "nobody listening"));
    }

    #[tokio::test]
    async fn test_new_registration_replaces_previous() {
        let channels = UserChannels::new();
        let mut first = channels.register(UserId::new(1));
        let mut second = channels.register(UserId::new(1));

        // The first channel's sender was dropped on replacement
        assert_eq!(first.next().await, None);

        assert!(channels.publish(UserId::new(1), "to second"));
        assert_eq!(second.next().await.as_deref(), Some("to second"));
        assert_eq!(channels.connected_users(), 1);
    }

    #[tokio::test]
    async fn test_stale_drop_keeps_newer_registration() {
        let channels = UserChannels::new();
        let first = channels.register(UserId::new(1));
        let _second = channels.register(UserId::new(1));

        drop(first);
        assert!(channels.is_connected(UserId::new(1)));
    }

    #[tokio::test]
    async fn test_drop_unregisters() {
        let channels = UserChannels::new();
        let channel = channels.register(UserId::new(2));
        assert!(channels.is_connected(UserId::new(2)));

        drop(channel);
        assert!(!channels.is_connected(UserId::new(2)));
        assert!(!channels.publish(UserId::new(2), "late"));
    }

    #[tokio::test]
    async fn test_full_channel_drops_message() {
        let channels = UserChannels::with_capacity(1);
        let _channel = channels.register(UserId::new(3));

        assert!(channels.publish(UserId::new(3), "first"));
        assert!(!channels.publish(UserId::new(3), "second"));
    }
}
