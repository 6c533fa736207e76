// HTTP routes
pub mod health;
pub mod tasks;
pub mod usage_stream;

pub use health::*;
pub use tasks::*;
pub use usage_stream::*;
