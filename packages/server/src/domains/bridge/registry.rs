//! Bookkeeping for open status-stream connections.
//!
//! The map lock is only held to insert, look up or remove entries, never
//! across I/O. A slot is reserved before the stream is opened so two callers
//! cannot connect the same remote job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::common::TaskId;
use crate::domains::bridge::BridgeError;

/// One live connection. Closing is idempotent.
#[derive(Debug)]
pub struct BridgeConnection {
    remote_id: String,
    task_id: TaskId,
    opened_at: DateTime<Utc>,
    token: CancellationToken,
    closed: AtomicBool,
}

impl BridgeConnection {
    fn new(remote_id: &str, task_id: TaskId) -> Self {
        Self {
            remote_id: remote_id.to_string(),
            task_id,
            opened_at: Utc::now(),
            token: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Signal the reader to stop. Returns `true` only for the first call.
    pub fn close(&self) -> bool {
        let first = self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.token.cancel();
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.token.cancelled().await
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            remote_id: self.remote_id.clone(),
            task_id: self.task_id,
            opened_at: self.opened_at,
        }
    }
}

/// Diagnostic view of an open connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub remote_id: String,
    pub task_id: TaskId,
    pub opened_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<HashMap<String, Arc<BridgeConnection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `remote_id`.
    pub fn reserve(
        &self,
        remote_id: &str,
        task_id: TaskId,
    ) -> Result<Arc<BridgeConnection>, BridgeError> {
        let mut connections = self.lock();
        if connections.contains_key(remote_id) {
            return Err(BridgeError::AlreadyConnected(remote_id.to_string()));
        }
        let connection = Arc::new(BridgeConnection::new(remote_id, task_id));
        connections.insert(remote_id.to_string(), connection.clone());
        Ok(connection)
    }

    /// Remove `connection` if it still owns its slot, and close it.
    pub fn release(&self, connection: &Arc<BridgeConnection>) -> bool {
        let removed = {
            let mut connections = self.lock();
            match connections.get(connection.remote_id()) {
                Some(current) if Arc::ptr_eq(current, connection) => {
                    connections.remove(connection.remote_id());
                    true
                }
                _ => false,
            }
        };
        if connection.close() {
            debug!(remote_id = %connection.remote_id(), "Bridge connection closed");
        }
        removed
    }

    /// Remove and close the connection for `remote_id`.
    pub fn stop(&self, remote_id: &str) -> bool {
        let connection = self.lock().remove(remote_id);
        match connection {
            Some(connection) => {
                connection.close();
                true
            }
            None => false,
        }
    }

    /// Remove and close every connection. Returns how many were open.
    pub fn stop_all(&self) -> usize {
        let drained: Vec<Arc<BridgeConnection>> =
            self.lock().drain().map(|(_, connection)| connection).collect();
        for connection in &drained {
            connection.close();
        }
        drained.len()
    }

    pub fn contains(&self, remote_id: &str) -> bool {
        self.lock().contains_key(remote_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open connections, oldest first.
    pub fn active(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> =
            self.lock().values().map(|connection| connection.info()).collect();
        infos.sort_by(|a, b| {
            a.opened_at
                .cmp(&b.opened_at)
                .then_with(|| a.remote_id.cmp(&b.remote_id))
        });
        infos
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<BridgeConnection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
