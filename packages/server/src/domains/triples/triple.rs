//! Canonical triple records.
//!
//! Extraction output is a JSON array (or JSON lines) of records shaped like
//! `{"head": {"type", "label"}, "relationship": {...}, "tail": {...},
//! "_chunk_index": 3, "_source_text": "..."}`. Missing or null fields become
//! empty strings; a record with a field of the wrong type is skipped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::common::MaterialId;
use crate::domains::projects::Material;

#[derive(Debug, Error)]
pub enum TripleParseError {
    #[error("Malformed triple file: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub label: String,
}

/// Where in which material a triple was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub material_id: MaterialId,
    pub material_name: String,
    pub chunk_index: i64,
    pub source_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Triple {
    pub head: Node,
    pub relationship: Node,
    pub tail: Node,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_info: Option<SourceInfo>,
}

impl Triple {
    /// Grouping key `headType-relType-tailType`.
    pub fn type_key(&self) -> String {
        format!(
            "{}-{}-{}",
            self.head.kind, self.relationship.kind, self.tail.kind
        )
    }

    fn from_raw(raw: RawTriple, material: &Material) -> Self {
        let source_info = raw.chunk_index.map(|chunk_index| SourceInfo {
            material_id: material.id,
            material_name: material.file_name().to_string(),
            chunk_index,
            source_text: raw.source_text.unwrap_or_default(),
        });

        Triple {
            head: raw.head.map(Node::from).unwrap_or_default(),
            relationship: raw.relationship.map(Node::from).unwrap_or_default(),
            tail: raw.tail.map(Node::from).unwrap_or_default(),
            source_info,
        }
    }
}

/// A node as it appears in extraction output. Absent and null fields are
/// allowed; anything other than a string is rejected.
#[derive(Debug, Deserialize)]
struct RawNode {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

impl From<RawNode> for Node {
    fn from(raw: RawNode) -> Self {
        Node {
            kind: raw.kind.unwrap_or_default(),
            label: raw.label.unwrap_or_default(),
        }
    }
}

/// One record of extraction output.
#[derive(Debug, Deserialize)]
struct RawTriple {
    #[serde(default)]
    head: Option<RawNode>,
    #[serde(default)]
    relationship: Option<RawNode>,
    #[serde(default)]
    tail: Option<RawNode>,
    #[serde(rename = "_chunk_index", default)]
    chunk_index: Option<i64>,
    #[serde(rename = "_source_text", default)]
    source_text: Option<String>,
}

/// Parse one material's extraction output.
///
/// A file that is not valid JSON (array or JSON lines) is an error. Records
/// that do not have the triple shape are logged and skipped.
pub fn parse_triples(text: &str, material: &Material) -> Result<Vec<Triple>, TripleParseError> {
    let text = text.trim_start_matches('\u{feff}').trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let records: Vec<Value> = if text.starts_with('[') {
        serde_json::from_str(text)?
    } else {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(serde_json::from_str::<Value>)
            .collect::<Result<_, _>>()?
    };

    let mut triples = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<RawTriple>(record) {
            Ok(raw) => triples.push(Triple::from_raw(raw, material)),
            Err(e) => {
                warn!(material_id = %material.id, record = index, error = %e, "Skipping malformed triple record");
            }
        }
    }

    Ok(triples)
}

/// Group triples by [`Triple::type_key`], preserving order within a group.
pub fn partition_by_type(triples: &[Triple]) -> BTreeMap<String, Vec<Triple>> {
    let mut groups: BTreeMap<String, Vec<Triple>> = BTreeMap::new();
    for triple in triples {
        groups
            .entry(triple.type_key())
            .or_default()
            .push(triple.clone());
    }
    groups
}
