//! Named filters. Each filter owns a single bit-vector so
//! lookup is O(1) once built.

use std::collections::{HashMap, VecDeque};

use heapgraph_model::{GraphView, NO_DISTANCE};

use crate::error::{QueryError, QueryResult};

pub struct NamedFilter {
    /// `marked[ordinal]` — a node passes the filter iff it's *not* marked.
    marked: Vec<bool>,
}

impl NamedFilter {
    pub fn accepts(&self, ordinal: u64) -> bool {
        !self.marked[ordinal as usize]
    }
}

/// BFS marking every node reachable from root while avoiding edges the
/// caller's `avoid` predicate rejects, then additionally marking every
/// node whose precomputed distance is `NO_DISTANCE` — shared by
/// `objectsRetainedByDetachedDomNodes` and `objectsRetainedByConsole`.
fn bfs_reachable_avoiding(
    view: &GraphView,
    distances: &[i32],
    avoid: impl Fn(&GraphView, u64, u64) -> bool,
) -> NamedFilter {
    let node_count = view.node_count as usize;
    let mut reached = vec![false; node_count];
    let root_ordinal = view.root_ordinal();
    reached[root_ordinal as usize] = true;
    let mut queue = VecDeque::from([root_ordinal]);

    while let Some(ordinal) = queue.pop_front() {
        for edge_index in view.edges_of(ordinal) {
            if avoid(view, ordinal, edge_index) {
                continue;
            }
            let target = view.edge_to_ordinal(edge_index);
            if !reached[target as usize] {
                reached[target as usize] = true;
                queue.push_back(target);
            }
        }
    }

    // A node is marked (filtered out) unless it's reachable without
    // crossing an avoided edge and has a real distance; nodes only
    // reachable through what was avoided are exactly what these filters
    // surface.
    let mut marked = vec![false; node_count];
    for ordinal in 0..node_count {
        marked[ordinal] = reached[ordinal] || distances[ordinal] == NO_DISTANCE;
    }
    NamedFilter { marked }
}

pub fn objects_retained_by_detached_dom_nodes(view: &GraphView, distances: &[i32]) -> NamedFilter {
    bfs_reachable_avoiding(view, distances, |view, _src, edge_index| {
        let target = view.edge_to_ordinal(edge_index);
        view.dom_link_state(target) == heapgraph_model::DomLinkState::Detached
    })
}

pub fn objects_retained_by_console(view: &GraphView, distances: &[i32]) -> NamedFilter {
    bfs_reachable_avoiding(view, distances, |view, src, _edge_index| {
        view.node_type_name(src) == "synthetic" && view.node_name(src).ends_with(" / DevTools console")
    })
}

fn is_flat_cons_string(view: &GraphView, ordinal: u64) -> bool {
    if view.node_type_name(ordinal) != "concatenated string" {
        return false;
    }
    for edge_index in view.edges_of(ordinal) {
        if view.edge_type_name(edge_index) != "internal" {
            continue;
        }
        let name_index = view.edge_name_or_index(edge_index);
        let field_name = view.string_at(name_index);
        if field_name == "first" || field_name == "second" {
            let target = view.edge_to_ordinal(edge_index);
            if view.node_name(target).is_empty() {
                return true;
            }
        }
    }
    false
}

pub fn duplicated_strings(view: &GraphView) -> NamedFilter {
    let node_count = view.node_count as usize;
    let mut marked = vec![false; node_count];
    let mut first_occurrence: HashMap<String, u64> = HashMap::new();

    for ordinal in 0..view.node_count {
        let type_name = view.node_type_name(ordinal);
        if type_name != "string" && type_name != "concatenated string" && type_name != "sliced string" {
            continue;
        }
        if type_name == "concatenated string" && is_flat_cons_string(view, ordinal) {
            continue;
        }
        let name = view.node_name(ordinal).to_string();
        if let Some(&first) = first_occurrence.get(&name) {
            marked[first as usize] = true;
            marked[ordinal as usize] = true;
        } else {
            first_occurrence.insert(name, ordinal);
        }
    }

    NamedFilter { marked }
}

pub fn create_named_filter(name: &str, view: &GraphView, distances: &[i32]) -> QueryResult<NamedFilter> {
    match name {
        "objectsRetainedByDetachedDomNodes" => Ok(objects_retained_by_detached_dom_nodes(view, distances)),
        "objectsRetainedByConsole" => Ok(objects_retained_by_console(view, distances)),
        "duplicatedStrings" => Ok(duplicated_strings(view)),
        other => Err(QueryError::UnknownFilter(other.to_string())),
    }
}
