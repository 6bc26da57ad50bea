//! Page-ownership gate.
//!
//! Marks every node reachable from a user root via non-weak edges with the
//! `PAGE_OBJECT` flag. The post-order indexer and dominator builder use
//! this to skip edges that would let a debugger-only retainer influence
//! page dominators.

use std::collections::VecDeque;

use heapgraph_model::{GraphView, flags};

use crate::distance::is_user_root;

/// Compute and set the `PAGE_OBJECT` flag on every node reachable from a
/// user root over non-weak edges.
pub fn compute(view: &mut GraphView) {
    let root_ordinal = view.root_ordinal();
    let mut queue: VecDeque<u64> = VecDeque::new();

    for edge_index in view.edges_of(root_ordinal) {
        if view.edge_type_name(edge_index) == "weak" {
            continue;
        }
        let target = view.edge_to_ordinal(edge_index);
        if is_user_root(view, target) && !view.is_page_object(target) {
            view.set_flag(target, flags::PAGE_OBJECT);
            queue.push_back(target);
        }
    }

    while let Some(ordinal) = queue.pop_front() {
        let targets: Vec<u64> = view
            .edges_of(ordinal)
            .filter(|&e| view.edge_type_name(e) != "weak")
            .map(|e| view.edge_to_ordinal(e))
            .collect();
        for target in targets {
            if !view.is_page_object(target) {
                view.set_flag(target, flags::PAGE_OBJECT);
                queue.push_back(target);
            }
        }
    }
}

/// Whether the edge `u -> v` should be skipped by the post-order/dominator
/// passes per the page-ownership gate: `u != root`, `v` is a page object,
/// and `u` is not.
pub fn skip_edge(view: &GraphView, root_ordinal: u64, src_ordinal: u64, target_ordinal: u64) -> bool {
    src_ordinal != root_ordinal && view.is_page_object(target_ordinal) && !view.is_page_object(src_ordinal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapgraph_model::RawSnapshot;

    #[test]
    fn marks_reachable_nodes_from_window_root() {
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
            "strings": ["GC roots","Window","B"]
        }"#;
        let raw = RawSnapshot::parse(json.as_bytes()).unwrap();
        let mut view = GraphView::build(&raw).unwrap();
        compute(&mut view);
        assert!(view.is_page_object(1));
        assert!(view.is_page_object(2));
        assert!(!view.is_page_object(0));
    }
}
