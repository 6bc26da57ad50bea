//! DOM-state propagator.
//!
//! Only runs when the snapshot carries a `detachedness` field. Propagates
//! attached/detached state from seeded nodes through native-typed targets,
//! and rewrites a node's name to `"Detached " + oldName` the moment it
//! becomes detached.

use std::collections::VecDeque;

use heapgraph_model::{DomLinkState, GraphView, flags};

const DETACHED_PREFIX: &str = "Detached ";

fn traversable_edge(view: &GraphView, edge_index: u64) -> bool {
    !matches!(view.edge_type_name(edge_index), "hidden" | "invisible" | "weak")
}

/// Run DOM-state propagation in place. No-op if the snapshot lacks a
/// `detachedness` field.
pub fn propagate(view: &mut GraphView) {
    if !view.has_detachedness() {
        return;
    }

    let node_count = view.node_count;
    let mut attached_queue: VecDeque<u64> = VecDeque::new();
    let mut detached_queue: VecDeque<u64> = VecDeque::new();
    let mut visited = vec![false; node_count as usize];
    let mut name_rewrite_cache: Vec<Option<u32>> = vec![None; view.strings().len()];

    for ordinal in 0..node_count {
        match view.dom_link_state(ordinal) {
            DomLinkState::Attached => {
                visited[ordinal as usize] = true;
                attached_queue.push_back(ordinal);
            }
            DomLinkState::Detached => {
                visited[ordinal as usize] = true;
                detached_queue.push_back(ordinal);
                view.set_flag(ordinal, flags::DETACHED_DOM_TREE_NODE);
                rename_detached(view, ordinal, &mut name_rewrite_cache);
            }
            DomLinkState::Unknown => {}
        }
    }

    while let Some(ordinal) = attached_queue.pop_front() {
        let targets = native_targets(view, ordinal);
        for target in targets {
            if visited[target as usize] {
                continue;
            }
            visited[target as usize] = true;
            view.set_dom_link_state(target, DomLinkState::Attached);
            view.set_flag(target, flags::CAN_BE_QUERIED);
            attached_queue.push_back(target);
        }
    }

    while let Some(ordinal) = detached_queue.pop_front() {
        let targets = native_targets(view, ordinal);
        for target in targets {
            if visited[target as usize] {
                continue;
            }
            visited[target as usize] = true;
            view.set_dom_link_state(target, DomLinkState::Detached);
            view.set_flag(target, flags::DETACHED_DOM_TREE_NODE);
            rename_detached(view, target, &mut name_rewrite_cache);
            detached_queue.push_back(target);
        }
    }
}

fn native_targets(view: &GraphView, ordinal: u64) -> Vec<u64> {
    view.edges_of(ordinal)
        .filter(|&e| traversable_edge(view, e))
        .map(|e| view.edge_to_ordinal(e))
        .filter(|&t| view.node_type_name(t) == "native")
        .collect()
}

fn rename_detached(view: &mut GraphView, ordinal: u64, cache: &mut Vec<Option<u32>>) {
    let old_index = view.node_name_string_index(ordinal);
    let old_idx = old_index as usize;
    if old_idx >= cache.len() {
        cache.resize(old_idx + 1, None);
    }
    let new_index = match cache[old_idx] {
        Some(i) => i,
        None => {
            let new_name = format!("{DETACHED_PREFIX}{}", view.string_at(old_index));
            let i = view.intern_string(new_name);
            if i as usize >= cache.len() {
                cache.resize(i as usize + 1, None);
            }
            cache[old_idx] = Some(i);
            i
        }
    };
    view.set_node_name_string_index(ordinal, new_index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapgraph_model::RawSnapshot;

    /// S5: `R(synthetic) -> Dom1(native, Detached) -> Dom2(native, Unknown)
    /// -> Js(object, Unknown)`.
    #[test]
    fn s5_detached_dom_propagates_through_native_only() {
        let json = r#"{
            "snapshot": {
                "meta": {
                    "node_fields": ["type", "name", "id", "self_size", "edge_count", "detachedness"],
                    "node_types": [["synthetic", "native", "object"], "string", "number", "number", "number", "number"],
                    "edge_fields": ["type", "name_or_index", "to_node"],
                    "edge_types": [["property"], "string_or_number", "node"]
                },
                "node_count": 4,
                "edge_count": 3
            },
            "nodes": [
                0, 0, 1, 0, 1, 0,
                1, 1, 3, 10, 1, 2,
                1, 2, 5, 20, 1, 0,
                2, 3, 7, 5, 0, 0
            ],
            "edges": [0,1,6,  0,1,12,  0,1,18],
            "strings": ["GC roots", "Dom1", "Dom2", "Js"]
        }"#;
        let raw = RawSnapshot::parse(json.as_bytes()).unwrap();
        let mut view = GraphView::build(&raw).unwrap();
        propagate(&mut view);
        assert!(matches!(view.dom_link_state(1), DomLinkState::Detached));
        assert!(matches!(view.dom_link_state(2), DomLinkState::Detached));
        assert!(matches!(view.dom_link_state(3), DomLinkState::Unknown));
        assert_eq!(view.node_name(1), "Detached Dom1");
        assert_eq!(view.node_name(2), "Detached Dom2");
        assert_eq!(view.node_name(3), "Js");
    }

    #[test]
    fn no_detachedness_field_is_noop() {
        let json = r#"{
            "snapshot": {
                "meta": {
                    "node_fields": ["type", "name", "id", "self_size", "edge_count"],
                    "node_types": [["synthetic", "object"], "string", "number", "number", "number"],
                    "edge_fields": ["type", "name_or_index", "to_node"],
                    "edge_types": [["property"], "string_or_number", "node"]
                },
                "node_count": 1,
                "edge_count": 0
            },
            "nodes": [0,0,1,0,0],
            "edges": [],
            "strings": ["GC roots"]
        }"#;
        let raw = RawSnapshot::parse(json.as_bytes()).unwrap();
        let mut view = GraphView::build(&raw).unwrap();
        propagate(&mut view);
        assert_eq!(view.node_name(0), "GC roots");
    }
}
