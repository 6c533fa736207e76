//! Kernel module - server infrastructure and dependencies.

pub mod blob_store;
pub mod deps;
pub mod test_dependencies;
pub mod traits;
pub mod user_channels;

pub use blob_store::FsBlobStore;
pub use deps::{ExtractionServiceAdapter, ServerDeps};
pub use test_dependencies::TestDependencies;
pub use traits::*;
pub use user_channels::{UserChannel, UserChannels};
