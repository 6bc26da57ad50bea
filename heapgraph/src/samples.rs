//! Derived output structs wire-compatible with the UI, plus
//! location/sample readers built on the location/sample flat arrays.

use heapgraph_model::{BASE_SYSTEM_DISTANCE, GraphView};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct StaticData {
    pub node_count: u64,
    pub root_node_index: u64,
    pub total_size: f64,
    pub max_js_node_id: u32,
}

pub fn static_data(view: &GraphView, total_size: f64) -> StaticData {
    let max_js_node_id = (0..view.node_count)
        .map(|ordinal| view.node_id(ordinal))
        .filter(|id| id % 2 == 1)
        .max()
        .unwrap_or(0);
    StaticData {
        node_count: view.node_count,
        root_node_index: view.root_index,
        total_size,
        max_js_node_id,
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Statistics {
    pub total: f64,
    pub v8heap: f64,
    pub native: f64,
    pub code: f64,
    pub js_arrays: f64,
    pub strings: f64,
    pub system: f64,
}

/// The `elements` internal child of an `array` node, when that child has
/// exactly one retainer (the array itself) — the case where `jsArrays`
/// folds the child's self-size into the array's own bucket instead of
/// counting it under whatever category it would otherwise land in.
fn singly_retained_elements_child(view: &GraphView, array_ordinal: u64) -> Option<u64> {
    for edge_index in view.edges_of(array_ordinal) {
        if view.edge_type_name(edge_index) != "internal" {
            continue;
        }
        let name_index = view.edge_name_or_index(edge_index);
        if view.string_at(name_index) != "elements" {
            continue;
        }
        let target = view.edge_to_ordinal(edge_index);
        let retainer_count =
            view.first_retainer_index[target as usize + 1] - view.first_retainer_index[target as usize];
        if retainer_count == 1 {
            return Some(target);
        }
    }
    None
}

pub fn compute_statistics(view: &GraphView, distances: &[i32]) -> Statistics {
    let mut stats = Statistics::default();

    // Nodes folded into their owning array's jsArrays bucket are skipped by
    // the per-type match below so their size isn't counted twice.
    let mut folded_elements_children: std::collections::HashMap<u64, u64> = std::collections::HashMap::new();
    for ordinal in 0..view.node_count {
        if view.node_type_name(ordinal) != "array" {
            continue;
        }
        if let Some(child) = singly_retained_elements_child(view, ordinal) {
            folded_elements_children.insert(ordinal, child);
        }
    }
    let folded_child_ordinals: std::collections::HashSet<u64> =
        folded_elements_children.values().copied().collect();

    for ordinal in 0..view.node_count {
        let size = view.node_self_size(ordinal) as f64;
        stats.total += size;
        if distances[ordinal as usize] >= BASE_SYSTEM_DISTANCE {
            stats.system += size;
        }
        if folded_child_ordinals.contains(&ordinal) {
            continue;
        }
        match view.node_type_name(ordinal) {
            "native" => stats.native += size,
            "code" => stats.code += size,
            "string" | "concatenated string" | "sliced string" => stats.strings += size,
            "array" => {
                let mut array_size = size;
                if let Some(&child) = folded_elements_children.get(&ordinal) {
                    array_size += view.node_self_size(child) as f64;
                }
                stats.js_arrays += array_size;
                stats.v8heap += array_size;
            }
            _ => stats.v8heap += size,
        }
    }
    stats
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Samples {
    pub timestamps_ms: Vec<f64>,
    pub last_assigned_ids: Vec<u32>,
    pub size_for_range: Vec<f64>,
}

/// Bin each JS-id (odd) node's self-size by lower-bound search over
/// `last_assigned_ids`; ids past the last bin are dropped.
pub fn compute_samples(view: &GraphView) -> Samples {
    let sample_count = view.sample_count();
    let mut timestamps_ms = Vec::with_capacity(sample_count);
    let mut last_assigned_ids = Vec::with_capacity(sample_count);
    for i in 0..sample_count {
        timestamps_ms.push(view.sample_timestamp_us(i) as f64 / 1000.0);
        last_assigned_ids.push(view.sample_last_assigned_id(i));
    }

    let mut size_for_range = vec![0.0f64; sample_count];
    for ordinal in 0..view.node_count {
        let id = view.node_id(ordinal);
        if id % 2 == 0 {
            continue;
        }
        let bin = last_assigned_ids.partition_point(|&last| last < id);
        if bin < sample_count {
            size_for_range[bin] += view.node_self_size(ordinal) as f64;
        }
    }

    Samples {
        timestamps_ms,
        last_assigned_ids,
        size_for_range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapgraph_model::RawSnapshot;

    fn build_view() -> GraphView {
        let json = r#"{
            "snapshot": {
                "meta": {
                    "node_fields": ["type", "name", "id", "self_size", "edge_count"],
                    "node_types": [["synthetic", "object"], "string", "number", "number", "number"],
                    "edge_fields": ["type", "name_or_index", "to_node"],
                    "edge_types": [["property"], "string_or_number", "node"]
                },
                "node_count": 2,
                "edge_count": 0
            },
            "nodes": [0,0,2,0,0,  1,0,7,10,0],
            "edges": [],
            "strings": ["GC roots"],
            "samples": [100, 7, 200, 9]
        }"#;
        let raw = RawSnapshot::parse(json.as_bytes()).unwrap();
        GraphView::build(&raw).unwrap()
    }

    #[test]
    fn static_data_picks_max_odd_id() {
        let view = build_view();
        let data = static_data(&view, 10.0);
        assert_eq!(data.max_js_node_id, 7);
    }

    #[test]
    fn samples_bin_by_last_assigned_id() {
        let view = build_view();
        let samples = compute_samples(&view);
        assert_eq!(samples.last_assigned_ids, vec![7, 9]);
        assert_eq!(samples.size_for_range, vec![10.0, 0.0]);
    }

    #[test]
    fn js_arrays_folds_in_singly_retained_elements_child() {
        let json = r#"{
            "snapshot": {
                "meta": {
                    "node_fields": ["type", "name", "id", "self_size", "edge_count"],
                    "node_types": [["synthetic", "array"], "string", "number", "number", "number"],
                    "edge_fields": ["type", "name_or_index", "to_node"],
                    "edge_types": [["property", "internal"], "string_or_number", "node"]
                },
                "node_count": 3,
                "edge_count": 2
            },
            "nodes": [
                0, 0, 0, 0, 1,
                1, 1, 3, 5, 1,
                1, 2, 5, 20, 0
            ],
            "edges": [0, 1, 5,  1, 3, 10],
            "strings": ["GC roots", "arr", "(array elements)", "elements"]
        }"#;
        let raw = RawSnapshot::parse(json.as_bytes()).unwrap();
        let mut view = GraphView::build(&raw).unwrap();
        crate::retainers::build(&mut view).unwrap();

        let distances = vec![0i32; view.node_count as usize];
        let stats = compute_statistics(&view, &distances);

        // The elements child's self-size (20) folds into the array's
        // jsArrays bucket alongside the array's own self-size (5), and is
        // not separately double-counted in v8heap.
        assert_eq!(stats.js_arrays, 25.0);
        assert_eq!(stats.v8heap, 25.0);
        assert_eq!(stats.total, 25.0);
    }
}
