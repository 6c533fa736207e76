//! Projects and their source materials.

pub mod models;

pub use models::{Material, Project};
