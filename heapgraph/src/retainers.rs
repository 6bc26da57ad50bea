//! Retainer (reverse-edge) index construction.
//!
//! Three linear passes over `edges`, filling `retaining_nodes`,
//! `retaining_edges` and `first_retainer_index` in place on the
//! [`GraphView`] that was built from the raw snapshot.

use heapgraph_model::GraphView;

use crate::error::{EngineError, Result};

/// Build the reverse-edge index. Must run before anything that calls
/// `GraphView::retaining_nodes`/`retaining_edges` (distance, post-order,
/// dominators) — there is deliberately no "not built yet" flag afterward:
/// callers rely on `Engine::initialize` having run this first.
pub fn build(view: &mut GraphView) -> Result<()> {
    let node_count = view.node_count;
    let nf = view.meta.node_field_count as u64;

    // Pass 1: count retainers per target ordinal.
    let mut counts = vec![0u64; node_count as usize + 1];
    for ordinal in 0..node_count {
        for edge_index in view.edges_of(ordinal) {
            let to_node_index = view.edge_to_node_index(edge_index);
            if to_node_index as u64 % nf != 0 {
                return Err(EngineError::InvalidToNodeIndex {
                    edge_index,
                    to_node_index,
                });
            }
            let to_ordinal = to_node_index as u64 / nf;
            counts[to_ordinal as usize + 1] += 1;
        }
    }

    // Pass 2: prefix sum -> first_retainer_index.
    for i in 1..counts.len() {
        counts[i] += counts[i - 1];
    }
    view.first_retainer_index = counts.clone();

    // Pass 3: fill retaining_nodes/retaining_edges using a cursor per bucket.
    let mut cursor = counts;
    for ordinal in 0..node_count {
        let node_index = view.ordinal_to_index(ordinal) as u32;
        for edge_index in view.edges_of(ordinal) {
            let to_ordinal = view.edge_to_node_index(edge_index) as u64 / nf;
            let slot = cursor[to_ordinal as usize];
            view.retaining_nodes.set(slot, node_index);
            view.retaining_edges.set(slot, edge_index as u32);
            cursor[to_ordinal as usize] += 1;
        }
    }

    Ok(())
}

/// Iterate the retainer (node_index, edge_index) pairs for a given ordinal.
pub fn retainers_of(view: &GraphView, ordinal: u64) -> impl Iterator<Item = (u32, u32)> + '_ {
    let start = view.first_retainer_index[ordinal as usize];
    let end = view.first_retainer_index[ordinal as usize + 1];
    (start..end).map(move |slot| (view.retaining_nodes.get(slot), view.retaining_edges.get(slot)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapgraph_model::{GraphView, RawSnapshot};

    fn chain_view() -> GraphView {
        let json = r#"{
            "snapshot": {
                "meta": {
                    "node_fields": ["type", "name", "id", "self_size", "edge_count", "trace_node_id"],
                    "node_types": [["synthetic", "object"], "string", "number", "number", "number", "number"],
                    "edge_fields": ["type", "name_or_index", "to_node"],
                    "edge_types": [["property", "weak"], "string_or_number", "node"]
                },
                "node_count": 3,
                "edge_count": 2
            },
            "nodes": [0,0,1,0,1,0,  1,1,3,10,1,0,  1,2,5,20,0,0],
            "edges": [0,1,6,  0,2,12],
            "strings": ["GC roots","A","B"]
        }"#;
        let raw = RawSnapshot::parse(json.as_bytes()).unwrap();
        GraphView::build(&raw).unwrap()
    }

    #[test]
    fn builds_reverse_edges() {
        let mut view = chain_view();
        build(&mut view).unwrap();
        assert_eq!(view.first_retainer_index, vec![0, 0, 1, 2]);
        let retainers_of_b: Vec<(u32, u32)> = retainers_of(&view, 2).collect();
        assert_eq!(retainers_of_b, vec![(6, 3)]);
    }

    #[test]
    fn rejects_misaligned_to_node_index() {
        let json = r#"{
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
            "nodes": [0,0,1,0,1,0,  1,1,2,0,0,0],
            "edges": [0,1,7],
            "strings": ["GC roots","App"]
        }"#;
        let raw = RawSnapshot::parse(json.as_bytes()).unwrap();
        let mut view = GraphView::build(&raw).unwrap();
        let err = build(&mut view).unwrap_err();
        assert!(matches!(err, EngineError::InvalidToNodeIndex { .. }));
    }
}
