//! BFS distance engine.
//!
//! Two BFS phases share one distance array and one FIFO queue: first from
//! every user root (distance 1), then from the synthetic root itself,
//! offset by [`heapgraph_model::BASE_SYSTEM_DISTANCE`] so system-only
//! objects sort after every page object.

use std::collections::VecDeque;

use heapgraph_model::{BASE_SYSTEM_DISTANCE, GraphView, NO_DISTANCE};

/// A page-observable entry point: a Window object or the synthetic
/// "(Document DOM trees)" root (glossary, "User root").
pub fn is_user_root(view: &GraphView, ordinal: u64) -> bool {
    let type_name = view.node_type_name(ordinal);
    let name = view.node_name(ordinal);
    (type_name == "object" && name.starts_with("Window"))
        || (type_name == "synthetic" && name == "(Document DOM trees)")
}

/// Edge filter used by a distance pass. Returning `false` rejects the edge
/// as if it didn't exist for this pass.
pub trait EdgeFilter {
    fn accept(&self, view: &GraphView, src_ordinal: u64, edge_index: u64) -> bool;
}

/// No-op filter: every non-weak edge is accepted.
pub struct NoFilter;
impl EdgeFilter for NoFilter {
    fn accept(&self, _view: &GraphView, _src_ordinal: u64, _edge_index: u64) -> bool {
        true
    }
}

/// Compute node distances from the synthetic root.
pub fn compute(view: &GraphView, filter: &dyn EdgeFilter) -> Vec<i32> {
    let node_count = view.node_count as usize;
    let mut distances = vec![NO_DISTANCE; node_count];
    let root_ordinal = view.root_ordinal();
    let mut queue: VecDeque<u64> = VecDeque::new();

    // Phase 1: user roots at distance 1.
    let mut visited_user_root = false;
    for edge_index in view.edges_of(root_ordinal) {
        if view.edge_type_name(edge_index) == "weak" {
            continue;
        }
        let target = view.edge_to_ordinal(edge_index);
        if is_user_root(view, target) && distances[target as usize] == NO_DISTANCE {
            distances[target as usize] = 1;
            queue.push_back(target);
            visited_user_root = true;
        }
    }
    drain(view, filter, &mut distances, &mut queue);

    // Phase 2: anything not reached through a user root, starting from the
    // synthetic root itself. Only offset by BASE_SYSTEM_DISTANCE when a user
    // root was actually visited in phase 1 — a snapshot with no user roots
    // (Node.js heaps, "expose internals" captures) has no page objects to
    // sort after, so the root starts at 0 like any other reachable node.
    if distances[root_ordinal as usize] == NO_DISTANCE {
        distances[root_ordinal as usize] = if visited_user_root { BASE_SYSTEM_DISTANCE } else { 0 };
        queue.push_back(root_ordinal);
    }
    drain(view, filter, &mut distances, &mut queue);

    distances
}

fn drain(view: &GraphView, filter: &dyn EdgeFilter, distances: &mut [i32], queue: &mut VecDeque<u64>) {
    while let Some(ordinal) = queue.pop_front() {
        let next_distance = distances[ordinal as usize] + 1;
        for edge_index in view.edges_of(ordinal) {
            if view.edge_type_name(edge_index) == "weak" {
                continue;
            }
            if !filter.accept(view, ordinal, edge_index) {
                continue;
            }
            let target = view.edge_to_ordinal(edge_index);
            if distances[target as usize] == NO_DISTANCE {
                distances[target as usize] = next_distance;
                queue.push_back(target);
            }
        }
    }
}

/// The retainers-view variant: a second distance array gated
/// by a caller-supplied set of ignored node ordinals. Toggling the ignored
/// set requires recomputing both this and the downstream ignored-edges set.
pub struct IgnoredNodesFilter<'a> {
    pub ignored: &'a [bool],
}

impl<'a> EdgeFilter for IgnoredNodesFilter<'a> {
    fn accept(&self, view: &GraphView, _src_ordinal: u64, edge_index: u64) -> bool {
        let target = view.edge_to_ordinal(edge_index);
        !self.ignored.get(target as usize).copied().unwrap_or(false)
    }
}

pub fn compute_retainers_view(view: &GraphView, ignored: &[bool]) -> Vec<i32> {
    compute(view, &IgnoredNodesFilter { ignored })
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapgraph_model::RawSnapshot;

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
    fn tiny_chain_distances_are_bfs_depth() {
        let view = chain_view();
        let distances = compute(&view, &NoFilter);
        // No user root in this fixture, so the root itself starts at 0 and
        // everything hangs off it at plain BFS depth, not system distance.
        assert_eq!(distances[0], 0);
        assert_eq!(distances[1], 1);
        assert_eq!(distances[2], 2);
    }

    #[test]
    fn weak_edges_never_establish_distance() {
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
            "edges": [1,1,6],
            "strings": ["GC roots","App"]
        }"#;
        let raw = RawSnapshot::parse(json.as_bytes()).unwrap();
        let view = GraphView::build(&raw).unwrap();
        let distances = compute(&view, &NoFilter);
        assert_eq!(distances[1], NO_DISTANCE);
    }
}
