// Knowledge Graph Platform - Task Coordinator
//
// Submits document-processing jobs to the remote extraction service, follows
// their status streams, charges word usage and materializes extracted triples.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
