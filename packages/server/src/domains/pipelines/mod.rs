//! Pipelines group the tasks run for one project.

pub mod models;

pub use models::Pipeline;
