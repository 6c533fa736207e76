//! Typed ID definitions for all domain entities.
//!
//! ```rust
//! use kg_server::common::{ProjectId, TaskId};
//!
//! let task_id = TaskId::new(1);
//! let project_id = ProjectId::new(1);
//!
//! // This would be a compile error:
//! // let wrong: ProjectId = task_id;
//! # let _ = (task_id, project_id);
//! ```

pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for Task entities (units of remote work).
pub struct Task;

/// Marker type for Pipeline entities.
pub struct Pipeline;

/// Marker type for Project entities.
pub struct Project;

/// Marker type for Material entities (source documents).
pub struct Material;

/// Marker type for platform users.
pub struct User;

/// Marker type for AiModel catalog entries.
pub struct AiModel;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

pub type TaskId = Id<Task>;

pub type PipelineId = Id<Pipeline>;

pub type ProjectId = Id<Project>;

pub type MaterialId = Id<Material>;

pub type UserId = Id<User>;

pub type AiModelId = Id<AiModel>;
