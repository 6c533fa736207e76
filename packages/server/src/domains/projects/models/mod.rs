pub mod material;
pub mod project;

pub use material::Material;
pub use project::Project;
