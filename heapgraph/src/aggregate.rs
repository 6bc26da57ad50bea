//! Class-based aggregator.

use std::collections::HashMap;

use heapgraph_model::{GraphView, NO_DISTANCE};

use crate::dominated::DominatedIndex;

#[derive(Debug, Clone)]
pub struct ClassAggregate {
    pub class_index: u32,
    pub count: u64,
    pub self_size: u64,
    pub min_distance: i32,
    pub max_retained_size: f64,
    pub type_name: String,
    /// Populated only for `object`/`native` types.
    pub name: Option<String>,
    pub node_indexes: Vec<u32>,
}

pub struct AggregateForDiff {
    pub ids: Vec<u32>,
    pub indexes: Vec<u32>,
    pub self_sizes: Vec<u64>,
}

/// A survivor predicate for `build_aggregates` (self_size > 0 and passing
/// the caller's filter).
pub trait AggregateFilter {
    fn accept(&self, view: &GraphView, ordinal: u64) -> bool;
}

pub struct AllObjects;
impl AggregateFilter for AllObjects {
    fn accept(&self, _view: &GraphView, _ordinal: u64) -> bool {
        true
    }
}

pub fn build_aggregates(
    view: &GraphView,
    distances: &[i32],
    filter: &dyn AggregateFilter,
) -> HashMap<u32, ClassAggregate> {
    let mut by_class: HashMap<u32, ClassAggregate> = HashMap::new();

    for ordinal in 0..view.node_count {
        let self_size = view.node_self_size(ordinal);
        if self_size == 0 || !filter.accept(view, ordinal) {
            continue;
        }
        let class_index = view.class_index(ordinal);
        let distance = distances[ordinal as usize];
        let type_name = view.node_type_name(ordinal).to_string();
        let entry = by_class.entry(class_index).or_insert_with(|| ClassAggregate {
            class_index,
            count: 0,
            self_size: 0,
            min_distance: i32::MAX,
            max_retained_size: 0.0,
            type_name: type_name.clone(),
            name: if type_name == "object" || type_name == "native" {
                Some(view.node_name(ordinal).to_string())
            } else {
                None
            },
            node_indexes: Vec::new(),
        });
        entry.count += 1;
        entry.self_size += self_size as u64;
        if distance != NO_DISTANCE {
            entry.min_distance = entry.min_distance.min(distance);
        }
        entry.node_indexes.push(view.ordinal_to_index(ordinal) as u32);
    }

    by_class
}

/// Second traversal, over the dominator tree from root: adds
/// `retained_size[v]` to a class's `max_retained_size` the first time that
/// class appears on the current root-to-node path.
pub fn fill_max_retained_size(
    view: &GraphView,
    dominated: &DominatedIndex,
    retained_sizes: &[f64],
    by_class: &mut HashMap<u32, ClassAggregate>,
) {
    let root_ordinal = view.root_ordinal();
    let mut seen_stack: Vec<Vec<u32>> = Vec::new();
    let mut seen_set: std::collections::HashSet<u32> = std::collections::HashSet::new();
    let mut stack: Vec<(u64, bool)> = vec![(root_ordinal, false)];

    while let Some((ordinal, is_exit)) = stack.pop() {
        if is_exit {
            if let Some(added) = seen_stack.pop() {
                for class_index in added {
                    seen_set.remove(&class_index);
                }
            }
            continue;
        }
        let class_index = view.class_index(ordinal);
        let mut added = Vec::new();
        if !seen_set.contains(&class_index) {
            seen_set.insert(class_index);
            added.push(class_index);
            if let Some(agg) = by_class.get_mut(&class_index) {
                agg.max_retained_size += retained_sizes[ordinal as usize];
            }
        }
        seen_stack.push(added);
        stack.push((ordinal, true));
        for &child in dominated.children_of(ordinal) {
            stack.push((child as u64, false));
        }
    }
}

pub fn to_diff_snapshot(view: &GraphView, by_class: &HashMap<u32, ClassAggregate>, class_index: u32) -> Option<AggregateForDiff> {
    let agg = by_class.get(&class_index)?;
    let mut pairs: Vec<(u32, u32)> = agg
        .node_indexes
        .iter()
        .map(|&idx| (view.node_id(view.index_to_ordinal(idx as u64)), idx))
        .collect();
    pairs.sort_by_key(|&(id, _)| id);
    let ids = pairs.iter().map(|&(id, _)| id).collect();
    let indexes: Vec<u32> = pairs.iter().map(|&(_, idx)| idx).collect();
    let self_sizes = indexes
        .iter()
        .map(|&idx| view.node_self_size(view.index_to_ordinal(idx as u64)) as u64)
        .collect();
    Some(AggregateForDiff { ids, indexes, self_sizes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{classname, distance, dominated, dominators, page_gate, postorder, retained_size};
    use heapgraph_model::RawSnapshot;

    #[test]
    fn counts_nodes_by_class() {
        let json = r#"{
            "snapshot": {
                "meta": {
                    "node_fields": ["type", "name", "id", "self_size", "edge_count"],
                    "node_types": [["synthetic", "object"], "string", "number", "number", "number"],
                    "edge_fields": ["type", "name_or_index", "to_node"],
                    "edge_types": [["property"], "string_or_number", "node"]
                },
                "node_count": 3,
                "edge_count": 2
            },
            "nodes": [0,0,1,0,2,  1,1,3,10,0,  1,1,5,20,0],
            "edges": [0,0,5,  0,0,10],
            "strings": ["GC roots", "Foo"]
        }"#;
        let raw = RawSnapshot::parse(json.as_bytes()).unwrap();
        let mut view = GraphView::build(&raw).unwrap();
        page_gate::compute(&mut view);
        classname::assign(&mut view).unwrap();
        let distances = distance::compute(&view, &distance::NoFilter);
        let by_class = build_aggregates(&view, &distances, &AllObjects);
        let foo_class = view.class_index(1);
        let agg = by_class.get(&foo_class).unwrap();
        assert_eq!(agg.count, 2);
        assert_eq!(agg.self_size, 30);
    }

    #[test]
    fn fills_max_retained_size_once_per_path() {
        let json = r#"{
            "snapshot": {
                "meta": {
                    "node_fields": ["type", "name", "id", "self_size", "edge_count"],
                    "node_types": [["synthetic", "object"], "string", "number", "number", "number"],
                    "edge_fields": ["type", "name_or_index", "to_node"],
                    "edge_types": [["property"], "string_or_number", "node"]
                },
                "node_count": 3,
                "edge_count": 2
            },
            "nodes": [0,0,1,0,2,  1,1,3,10,0,  1,1,5,20,0],
            "edges": [0,0,5,  0,0,10],
            "strings": ["GC roots", "Foo"]
        }"#;
        let raw = RawSnapshot::parse(json.as_bytes()).unwrap();
        let mut view = GraphView::build(&raw).unwrap();
        page_gate::compute(&mut view);
        classname::assign(&mut view).unwrap();
        let distances = distance::compute(&view, &distance::NoFilter);
        let post = postorder::build(&view).unwrap();
        let dom = dominators::build(&view, &post);
        let retained = retained_size::compute(&view, &post, &dom);
        let dominated_index = dominated::build(&view, &dom);
        let mut by_class = build_aggregates(&view, &distances, &AllObjects);
        fill_max_retained_size(&view, &dominated_index, &retained, &mut by_class);
        let foo_class = view.class_index(1);
        assert!(by_class.get(&foo_class).unwrap().max_retained_size > 0.0);
    }
}
