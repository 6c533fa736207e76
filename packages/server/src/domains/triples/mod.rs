//! Triples domain - parsing extraction output and persisting it as blobs.

pub mod materialize;
pub mod triple;

pub use materialize::{materialize_results, MaterialOutput, MaterializeSummary};
pub use triple::{parse_triples, partition_by_type, Node, SourceInfo, Triple, TripleParseError};
