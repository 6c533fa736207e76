// Business domains
pub mod billing;
pub mod bridge;
pub mod pipelines;
pub mod projects;
pub mod tasks;
pub mod triples;
