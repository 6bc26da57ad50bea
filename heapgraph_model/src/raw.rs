//! Whole-file loader for `.heapsnapshot` JSON.
//!
//! This is intentionally not a streaming parser — the engine's own scope
//! starts from an already-parsed value, so this loader exists
//! only to get a real file into that shape for the CLI and test fixtures.

use std::io::Read;

use serde::Deserialize;
use thiserror::Error;

use crate::meta::{FieldMeta, MetaError, SnapshotMeta};
use crate::paged::PagedU32Array;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid snapshot meta-schema: {0}")]
    Meta(#[from] MetaError),

    #[error("node_count*node_fields ({expected}) does not match nodes array length ({actual})")]
    NodeArrayLengthMismatch { expected: u64, actual: u64 },

    #[error("edge_count*edge_fields ({expected}) does not match edges array length ({actual})")]
    EdgeArrayLengthMismatch { expected: u64, actual: u64 },

    #[error("root_index {0} is out of range or not a multiple of the node field count")]
    InvalidRootIndex(u64),

    #[error("class index {0} overflows the 30 bits reserved for it in the packed detachedness field")]
    ClassIndexOverflow(u32),
}

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Debug, Deserialize)]
struct RawMeta {
    meta: FieldMeta,
    node_count: u64,
    edge_count: u64,
    #[serde(default)]
    trace_function_count: u64,
}

/// The top-level shape of a `.heapsnapshot` file.
#[derive(Debug, Deserialize)]
pub struct RawSnapshot {
    snapshot: RawMeta,
    nodes: Vec<u32>,
    edges: Vec<u32>,
    strings: Vec<String>,
    #[serde(default)]
    locations: Vec<u32>,
    #[serde(default)]
    samples: Vec<u32>,
    #[serde(default)]
    trace_function_infos: Vec<u32>,
    #[serde(default)]
    trace_tree: serde_json::Value,
    #[serde(default)]
    root_index: Option<u64>,
}

impl RawSnapshot {
    /// Parse a complete `.heapsnapshot` document from any `Read` source.
    pub fn parse<R: Read>(reader: R) -> Result<Self> {
        let raw: RawSnapshot = serde_json::from_reader(reader)?;
        raw.validate()?;
        Ok(raw)
    }

    fn validate(&self) -> Result<()> {
        let meta = SnapshotMeta::from_field_meta(&self.snapshot.meta)?;
        let expected_nodes = self.snapshot.node_count * meta.node_field_count as u64;
        if expected_nodes != self.nodes.len() as u64 {
            return Err(ModelError::NodeArrayLengthMismatch {
                expected: expected_nodes,
                actual: self.nodes.len() as u64,
            });
        }
        let expected_edges = self.snapshot.edge_count * meta.edge_field_count as u64;
        if expected_edges != self.edges.len() as u64 {
            return Err(ModelError::EdgeArrayLengthMismatch {
                expected: expected_edges,
                actual: self.edges.len() as u64,
            });
        }
        Ok(())
    }

    pub fn meta(&self) -> Result<SnapshotMeta> {
        Ok(SnapshotMeta::from_field_meta(&self.snapshot.meta)?)
    }

    pub fn node_count(&self) -> u64 {
        self.snapshot.node_count
    }

    pub fn edge_count(&self) -> u64 {
        self.snapshot.edge_count
    }

    pub fn nodes(&self) -> PagedU32Array {
        PagedU32Array::from_flat(self.nodes.clone())
    }

    pub fn edges(&self) -> PagedU32Array {
        PagedU32Array::from_flat(self.edges.clone())
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn locations(&self) -> &[u32] {
        &self.locations
    }

    pub fn samples(&self) -> &[u32] {
        &self.samples
    }

    /// Root node index; defaults to 0 (the convention used by every
    /// `.heapsnapshot` producer when the field is absent).
    pub fn root_index(&self) -> Result<u64> {
        let idx = self.root_index.unwrap_or(0);
        let meta = self.meta()?;
        if idx % meta.node_field_count as u64 != 0
            || idx >= self.snapshot.node_count * meta.node_field_count as u64
        {
            return Err(ModelError::InvalidRootIndex(idx));
        }
        Ok(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "snapshot": {
                "meta": {
                    "node_fields": ["type", "name", "id", "self_size", "edge_count", "trace_node_id"],
                    "node_types": [["synthetic", "object"], "string", "number", "number", "number", "number"],
                    "edge_fields": ["type", "name_or_index", "to_node"],
                    "edge_types": [["property", "weak"], "string_or_number", "node"]
                },
                "node_count": 2,
                "edge_count": 1
            },
            "nodes": [0, 0, 1, 0, 1, 0,  1, 1, 2, 0, 0, 0],
            "edges": [0, 1, 6],
            "strings": ["GC roots", "App"]
        }"#
    }

    #[test]
    fn parses_minimal_snapshot() {
        let raw = RawSnapshot::parse(minimal_json().as_bytes()).unwrap();
        assert_eq!(raw.node_count(), 2);
        assert_eq!(raw.edge_count(), 1);
        assert_eq!(raw.strings(), &["GC roots".to_string(), "App".to_string()]);
        assert_eq!(raw.root_index().unwrap(), 0);
    }

    #[test]
    fn rejects_mismatched_node_array_length() {
        let bad = minimal_json().replace(r#""node_count": 2"#, r#""node_count": 3"#);
        let err = RawSnapshot::parse(bad.as_bytes()).unwrap_err();
        assert!(matches!(err, ModelError::NodeArrayLengthMismatch { .. }));
    }
}
