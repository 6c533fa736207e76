//! Tasks domain activities - entry-point business logic
//!
//! Called from the HTTP routes. Activities take raw input, validate it and
//! return final models.

pub mod cancel;
pub mod submit;

pub use cancel::cancel_task;
pub use submit::{submit_task, SubmitTask};
