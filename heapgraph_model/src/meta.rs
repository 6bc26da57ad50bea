//! Snapshot meta-schema: field layouts and enum tables.

use serde::{Deserialize, Serialize};

/// An index into a `node_types`/`edge_types` enum table, or `None` for a
/// field that stores a raw numeric value (e.g. `id`, `self_size`) rather
/// than an enum member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeTypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeTypeId(pub u32);

/// Raw `snapshot.meta` as it appears in a `.heapsnapshot` file: parallel
/// arrays of field names and per-field type tables. `node_types[i]`/
/// `edge_types[i]` is either an array of enum member names (when field `i`
/// is an enum column, namely `type`) or a bare string describing the
/// field's scalar kind ("number", "string_or_number", "node", ...).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldMeta {
    pub node_fields: Vec<String>,
    pub node_types: Vec<serde_json::Value>,
    pub edge_fields: Vec<String>,
    pub edge_types: Vec<serde_json::Value>,
    #[serde(default)]
    pub location_fields: Vec<String>,
    #[serde(default)]
    pub sample_fields: Vec<String>,
    #[serde(default)]
    pub trace_function_info_fields: Vec<String>,
    #[serde(default)]
    pub trace_node_fields: Vec<String>,
}

/// Resolved offsets and enum tables derived from [`FieldMeta`]; this is
/// what the engine actually indexes with, computed once at load time.
#[derive(Debug, Clone)]
pub struct SnapshotMeta {
    pub node_field_count: usize,
    pub node_type_offset: usize,
    pub node_name_offset: usize,
    pub node_id_offset: usize,
    pub node_self_size_offset: usize,
    pub node_edge_count_offset: usize,
    pub node_trace_node_id_offset: Option<usize>,
    pub node_detachedness_offset: Option<usize>,
    pub node_type_names: Vec<String>,

    pub edge_field_count: usize,
    pub edge_type_offset: usize,
    pub edge_name_or_index_offset: usize,
    pub edge_to_node_offset: usize,
    pub edge_type_names: Vec<String>,

    pub location_field_count: usize,
    pub location_node_index_offset: Option<usize>,
    pub location_script_id_offset: Option<usize>,
    pub location_line_offset: Option<usize>,
    pub location_column_offset: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    #[error("snapshot.meta is missing required node field '{0}'")]
    MissingNodeField(&'static str),
    #[error("snapshot.meta is missing required edge field '{0}'")]
    MissingEdgeField(&'static str),
    #[error("snapshot.meta node_types[{0}] is not an array of type names")]
    InvalidNodeTypeTable(usize),
    #[error("snapshot.meta edge_types[{0}] is not an array of type names")]
    InvalidEdgeTypeTable(usize),
}

impl SnapshotMeta {
    pub fn from_field_meta(meta: &FieldMeta) -> Result<Self, MetaError> {
        let node_field_count = meta.node_fields.len();
        let find_node = |name: &'static str| {
            meta.node_fields
                .iter()
                .position(|f| f == name)
                .ok_or(MetaError::MissingNodeField(name))
        };
        let node_type_offset = find_node("type")?;
        let node_name_offset = find_node("name")?;
        let node_id_offset = find_node("id")?;
        let node_self_size_offset = find_node("self_size")?;
        let node_edge_count_offset = find_node("edge_count")?;
        let node_trace_node_id_offset = meta.node_fields.iter().position(|f| f == "trace_node_id");
        let node_detachedness_offset = meta
            .node_fields
            .iter()
            .position(|f| f == "detachedness");

        let node_type_names = meta
            .node_types
            .get(node_type_offset)
            .and_then(|v| v.as_array())
            .ok_or(MetaError::InvalidNodeTypeTable(node_type_offset))?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect::<Vec<_>>();

        let edge_field_count = meta.edge_fields.len();
        let find_edge = |name: &'static str| {
            meta.edge_fields
                .iter()
                .position(|f| f == name)
                .ok_or(MetaError::MissingEdgeField(name))
        };
        let edge_type_offset = find_edge("type")?;
        let edge_name_or_index_offset = find_edge("name_or_index")?;
        let edge_to_node_offset = find_edge("to_node")?;

        let mut edge_type_names = meta
            .edge_types
            .get(edge_type_offset)
            .and_then(|v| v.as_array())
            .ok_or(MetaError::InvalidEdgeTypeTable(edge_type_offset))?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect::<Vec<_>>();
        // Spec §6: a synthetic `invisible` type is appended after load.
        edge_type_names.push("invisible".to_string());

        let location_field_count = meta.location_fields.len();
        let location_node_index_offset = meta.location_fields.iter().position(|f| f == "node_index");
        let location_script_id_offset = meta.location_fields.iter().position(|f| f == "script_id");
        let location_line_offset = meta.location_fields.iter().position(|f| f == "line");
        let location_column_offset = meta.location_fields.iter().position(|f| f == "column");

        Ok(SnapshotMeta {
            node_field_count,
            node_type_offset,
            node_name_offset,
            node_id_offset,
            node_self_size_offset,
            node_edge_count_offset,
            node_trace_node_id_offset,
            node_detachedness_offset,
            node_type_names,
            edge_field_count,
            edge_type_offset,
            edge_name_or_index_offset,
            edge_to_node_offset,
            edge_type_names,
            location_field_count,
            location_node_index_offset,
            location_script_id_offset,
            location_line_offset,
            location_column_offset,
        })
    }

    pub fn node_type_name(&self, id: u32) -> &str {
        self.node_type_names
            .get(id as usize)
            .map(String::as_str)
            .unwrap_or("unknown")
    }

    pub fn edge_type_name(&self, id: u32) -> &str {
        self.edge_type_names
            .get(id as usize)
            .map(String::as_str)
            .unwrap_or("unknown")
    }

    pub fn node_type_id(&self, name: &str) -> Option<u32> {
        self.node_type_names
            .iter()
            .position(|n| n == name)
            .map(|i| i as u32)
    }

    pub fn edge_type_id(&self, name: &str) -> Option<u32> {
        self.edge_type_names
            .iter()
            .position(|n| n == name)
            .map(|i| i as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_field_meta() -> FieldMeta {
        FieldMeta {
            node_fields: vec![
                "type".into(),
                "name".into(),
                "id".into(),
                "self_size".into(),
                "edge_count".into(),
                "trace_node_id".into(),
            ],
            node_types: vec![
                serde_json::json!(["hidden", "array", "object", "synthetic"]),
                serde_json::json!("string"),
                serde_json::json!("number"),
                serde_json::json!("number"),
                serde_json::json!("number"),
                serde_json::json!("number"),
            ],
            edge_fields: vec!["type".into(), "name_or_index".into(), "to_node".into()],
            edge_types: vec![
                serde_json::json!(["element", "property", "weak"]),
                serde_json::json!("string_or_number"),
                serde_json::json!("node"),
            ],
            location_fields: vec![],
            sample_fields: vec![],
            trace_function_info_fields: vec![],
            trace_node_fields: vec![],
        }
    }

    #[test]
    fn resolves_offsets() {
        let fm = sample_field_meta();
        let meta = SnapshotMeta::from_field_meta(&fm).unwrap();
        assert_eq!(meta.node_type_offset, 0);
        assert_eq!(meta.node_id_offset, 2);
        assert_eq!(meta.node_type_name(2), "object");
        assert_eq!(meta.edge_type_name(1), "property");
        // synthetic invisible type appended
        assert_eq!(meta.edge_type_name(3), "invisible");
    }

    #[test]
    fn missing_field_errors() {
        let mut fm = sample_field_meta();
        fm.node_fields.retain(|f| f != "id");
        let err = SnapshotMeta::from_field_meta(&fm).unwrap_err();
        assert!(matches!(err, MetaError::MissingNodeField("id")));
    }
}
