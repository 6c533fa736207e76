//! Streaming status bridge.
//!
//! Keeps one event-stream connection per remote job and drives the local
//! task's state from the frames it receives.

pub mod error;
pub mod manager;
pub mod registry;
pub mod sink;
pub mod translate;
pub mod writer;

pub use error::BridgeError;
pub use manager::{BridgeManager, StreamEnd, DEFAULT_STREAM_DEADLINE};
pub use registry::{BridgeConnection, ConnectionInfo, ConnectionRegistry};
pub use sink::{CompletionOutcome, StatusSink};
pub use translate::{translate, StatusUpdate};
pub use writer::TaskStatusWriter;
