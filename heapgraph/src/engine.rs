//! The engine: the single orchestrator that runs every analysis pass over
//! a parsed snapshot exactly once and answers every query the UI side
//! issues afterward.
//!
//! `Engine::initialize` is the only mutation entry point for the graph;
//! every other method here is a pure query over the derived arrays it
//! built, or a cache lookup/insert that never touches `GraphView`.

use std::collections::HashMap;

use heapgraph_model::{BASE_UNREACHABLE_DISTANCE, GraphView, NO_DISTANCE, RawSnapshot};
use serde::Serialize;

use crate::aggregate::{self, AggregateFilter, AggregateForDiff, AllObjects, ClassAggregate};
use crate::allocation::AllocationProfileSource;
use crate::classname;
use crate::diff::{self, Diff};
use crate::dom_state;
use crate::dominated::{self, DominatedIndex};
use crate::dominators;
use crate::error::{EngineError, QueryError, Result};
use crate::filters::{self, NamedFilter};
use crate::page_gate;
use crate::postorder::{self, PostorderResult, StructuralWarnings};
use crate::retained_size;
use crate::retainers;
use crate::samples::{self, Samples, Statistics, StaticData};
use crate::shallow_size;

/// A node, fully resolved for the UI.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSerialization {
    pub id: u32,
    pub name: String,
    pub distance: i32,
    pub node_index: u32,
    pub retained_size: f64,
    pub self_size: u32,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_be_queried: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detached_dom_tree_node: Option<bool>,
}

/// An edge, fully resolved for the UI.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeSerialization {
    pub name: String,
    pub node: u32,
    #[serde(rename = "type")]
    pub type_name: String,
    pub edge_index: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationSerialization {
    pub node_index: u32,
    pub script_id: Option<u32>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

/// A class-name-keyed snapshot of one engine's aggregates, suitable for
/// diffing against another snapshot. Keyed by the resolved
/// class *name* text, not the class index, since indexes are local to each
/// snapshot's string table.
#[derive(Debug, Default)]
pub struct DiffBase {
    by_class_name: HashMap<String, AggregateForDiff>,
}

impl DiffBase {
    pub fn get(&self, class_name: &str) -> Option<&AggregateForDiff> {
        self.by_class_name.get(class_name)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.by_class_name.keys().map(String::as_str)
    }
}

/// Filter for `get_aggregates_by_class_name`'s `"NodeIdRange: a..b"` synthetic
/// cache key.
struct NodeIdRangeFilter {
    start: u32,
    end: u32,
}

impl AggregateFilter for NodeIdRangeFilter {
    fn accept(&self, view: &GraphView, ordinal: u64) -> bool {
        let id = view.node_id(ordinal);
        id >= self.start && id < self.end
    }
}

fn parse_node_id_range_key(key: &str) -> Option<NodeIdRangeFilter> {
    let rest = key.strip_prefix("NodeIdRange: ")?;
    let (start, end) = rest.split_once("..")?;
    Some(NodeIdRangeFilter {
        start: start.parse().ok()?,
        end: end.parse().ok()?,
    })
}

/// Everything derived from one parsed snapshot: the owned, mutated
/// [`GraphView`] plus every array and cache built on top of it.
pub struct Engine {
    pub view: GraphView,
    pub distances: Vec<i32>,
    pub postorder: PostorderResult,
    pub dominators_tree: Vec<u64>,
    pub retained_sizes: Vec<f64>,
    pub dominated: DominatedIndex,
    pub static_data: StaticData,
    pub statistics: Statistics,
    pub samples: Samples,

    retainer_distances: Option<Vec<i32>>,
    ignored_nodes: Vec<bool>,
    /// Raw edge indexes (array position, not a dense ordinal) ignored by
    /// the current retainers-view toggle.
    ignored_edges: std::collections::HashSet<u32>,

    aggregate_cache: HashMap<String, HashMap<u32, ClassAggregate>>,
    named_filter_cache: HashMap<String, NamedFilter>,
    diff_bases: HashMap<String, DiffBase>,

    allocation_profile: Box<dyn AllocationProfileSource>,
}

impl Engine {
    /// Run every analysis pass once, in dependency order.
    /// `cancel` is polled at phase boundaries; if it ever returns `true`
    /// the engine stops and returns [`EngineError::Cancelled`] with no
    /// partial `Engine` handed back (the caller's prior state, if any,
    /// stays untouched).
    pub fn initialize(
        raw: &RawSnapshot,
        allocation_profile: Box<dyn AllocationProfileSource>,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<Engine> {
        let check_cancel = |phase: &str| -> Result<()> {
            if cancel.map(|c| c()).unwrap_or(false) {
                return Err(EngineError::Cancelled { phase: phase.to_string() });
            }
            Ok(())
        };

        tracing::info!(phase = "parse", "building graph view");
        let mut view = GraphView::build(raw)?;

        tracing::info!(phase = "Building edge indexes", "done in GraphView::build");
        check_cancel("Building retainers")?;

        tracing::info!(phase = "Building retainers", "");
        retainers::build(&mut view)?;

        page_gate::compute(&mut view);
        check_cancel("Shallow-size reassignment")?;

        tracing::info!(phase = "Propagating shallow sizes", "");
        shallow_size::reassign(&mut view)?;

        check_cancel("Building distances")?;
        tracing::info!(phase = "Building distances", "");
        let distances = crate::distance::compute(&view, &crate::distance::NoFilter);

        check_cancel("Building post-order index")?;
        tracing::info!(phase = "Building post-order index", "");
        let postorder = postorder::build(&view)?;
        if !postorder.warnings.only_weak_retainers.is_empty() {
            tracing::warn!(
                count = postorder.warnings.only_weak_retainers.len(),
                "nodes with only weak retainers"
            );
        }
        if !postorder.warnings.unreachable.is_empty() {
            tracing::warn!(count = postorder.warnings.unreachable.len(), "unreachable nodes");
        }

        check_cancel("Building dominator tree")?;
        tracing::info!(phase = "Building dominator tree", "");
        let dominators_tree = dominators::build(&view, &postorder);

        tracing::info!(phase = "Calculating retained sizes", "");
        let retained_sizes = retained_size::compute(&view, &postorder, &dominators_tree);
        let dominated = dominated::build(&view, &dominators_tree);

        check_cancel("Propagating DOM state")?;
        tracing::info!(phase = "Propagating DOM state", "");
        dom_state::propagate(&mut view);

        tracing::info!(phase = "Building class names", "");
        classname::assign(&mut view)?;

        let total_size: f64 = (0..view.node_count).map(|o| view.node_self_size(o) as f64).sum();
        let static_data = samples::static_data(&view, total_size);
        let statistics = samples::compute_statistics(&view, &distances);
        let sample_data = samples::compute_samples(&view);

        let node_count = view.node_count as usize;
        Ok(Engine {
            view,
            distances,
            postorder,
            dominators_tree,
            retained_sizes,
            dominated,
            static_data,
            statistics,
            samples: sample_data,
            retainer_distances: None,
            ignored_nodes: vec![false; node_count],
            ignored_edges: std::collections::HashSet::new(),
            aggregate_cache: HashMap::new(),
            named_filter_cache: HashMap::new(),
            diff_bases: HashMap::new(),
            allocation_profile,
        })
    }

    /// Drop every cache (aggregates, named filters, diff bases, retainer-
    /// view distances) without rebuilding any derived array.
    pub fn reset(&mut self) {
        self.aggregate_cache.clear();
        self.named_filter_cache.clear();
        self.diff_bases.clear();
        self.retainer_distances = None;
        self.ignored_edges.clear();
        for flag in &mut self.ignored_nodes {
            *flag = false;
        }
    }

    /// Structural warnings collected while building the post-order index
    ///: nodes with only weak/shortcut retainers, and nodes that
    /// stayed unreachable even after recovery.
    pub fn warnings(&self) -> &StructuralWarnings {
        &self.postorder.warnings
    }

    // ------------------------------------------------------------------
    // Retainers-view distance toggle
    // ------------------------------------------------------------------

    /// Toggle the "ignored nodes in retainers view" set and recompute the
    /// retainers-view distance array and the ignored-edges set atomically
    /// before returning.
    pub fn set_retainers_view_ignored_nodes(&mut self, ignored: Vec<bool>) {
        self.ignored_nodes = ignored;
        self.retainer_distances = Some(crate::distance::compute_retainers_view(&self.view, &self.ignored_nodes));

        let mut ignored_edges = std::collections::HashSet::new();
        for ordinal in 0..self.view.node_count {
            let src_ignored = self.ignored_nodes.get(ordinal as usize).copied().unwrap_or(false);
            for edge_index in self.view.edges_of(ordinal) {
                let target = self.view.edge_to_ordinal(edge_index);
                let target_ignored = self.ignored_nodes.get(target as usize).copied().unwrap_or(false);
                if src_ignored || target_ignored {
                    ignored_edges.insert(edge_index as u32);
                }
            }
        }
        self.ignored_edges = ignored_edges;
    }

    fn retainer_distance_of(&self, ordinal: u64) -> i32 {
        self.retainer_distances
            .as_ref()
            .map(|d| d[ordinal as usize])
            .unwrap_or(self.distances[ordinal as usize])
    }

    // ------------------------------------------------------------------
    // Node/edge serialization
    // ------------------------------------------------------------------

    pub fn serialize_node(&self, ordinal: u64) -> NodeSerialization {
        let view = &self.view;
        NodeSerialization {
            id: view.node_id(ordinal),
            name: view.node_name(ordinal).to_string(),
            distance: self.distances[ordinal as usize],
            node_index: view.ordinal_to_index(ordinal) as u32,
            retained_size: self.retained_sizes[ordinal as usize],
            self_size: view.node_self_size(ordinal),
            type_name: view.node_type_name(ordinal).to_string(),
            can_be_queried: if view.has_detachedness() {
                Some(view.flag(ordinal, heapgraph_model::flags::CAN_BE_QUERIED))
            } else {
                None
            },
            detached_dom_tree_node: if view.has_detachedness() {
                Some(view.flag(ordinal, heapgraph_model::flags::DETACHED_DOM_TREE_NODE))
            } else {
                None
            },
        }
    }

    pub fn serialize_edge(&self, edge_index: u64) -> EdgeSerialization {
        let view = &self.view;
        let name_or_index = view.edge_name_or_index(edge_index);
        let type_name = view.edge_type_name(edge_index);
        let name = if type_name == "element" {
            name_or_index.to_string()
        } else {
            view.string_at(name_or_index).to_string()
        };
        EdgeSerialization {
            name,
            node: view.edge_to_node_index(edge_index),
            type_name: type_name.to_string(),
            edge_index: edge_index as u32,
        }
    }

    /// Serialize a retaining edge's source node as a retainer-view row;
    /// `distance` is overridden to [`BASE_UNREACHABLE_DISTANCE`] when the
    /// edge is ignored in the retainers view.
    pub fn serialize_retainer(&self, src_node_index: u32, edge_index: u32) -> NodeSerialization {
        let src_ordinal = self.view.index_to_ordinal(src_node_index as u64);
        let mut node = self.serialize_node(src_ordinal);
        node.distance = if self.ignored_edges.contains(&edge_index) {
            BASE_UNREACHABLE_DISTANCE
        } else {
            self.retainer_distance_of(src_ordinal)
        };
        node
    }

    pub fn retainers_of(&self, node_index: u32) -> Vec<EdgeSerialization> {
        let ordinal = self.view.index_to_ordinal(node_index as u64);
        retainers::retainers_of(&self.view, ordinal)
            .map(|(src, edge)| self.serialize_retainer_edge(src, edge))
            .collect()
    }

    fn serialize_retainer_edge(&self, src_node_index: u32, edge_index: u32) -> EdgeSerialization {
        let view = &self.view;
        let name_or_index = view.edge_name_or_index(edge_index as u64);
        let type_name = view.edge_type_name(edge_index as u64);
        let name = if type_name == "element" {
            name_or_index.to_string()
        } else {
            view.string_at(name_or_index).to_string()
        };
        EdgeSerialization {
            name,
            node: src_node_index,
            type_name: type_name.to_string(),
            edge_index,
        }
    }

    // ------------------------------------------------------------------
    // Locations
    // ------------------------------------------------------------------

    pub fn get_location(&self, node_index: u32) -> Option<LocationSerialization> {
        let ordinal = self.view.index_to_ordinal(node_index as u64);
        let location = self.view.location_for_node(ordinal)?;
        Some(LocationSerialization {
            node_index,
            script_id: location.script_id(),
            line: location.line(),
            column: location.column(),
        })
    }

    // ------------------------------------------------------------------
    // Class names
    // ------------------------------------------------------------------

    pub fn node_class_name(&self, node_index: u32) -> String {
        let ordinal = self.view.index_to_ordinal(node_index as u64);
        let class_index = self.view.class_index(ordinal);
        self.view.string_at(class_index).to_string()
    }

    /// Linear scan from node id to ordinal; fine for CLI/query use, not
    /// called from any per-node analysis pass.
    pub fn node_id_to_ordinal(&self, id: u32) -> Option<u64> {
        (0..self.view.node_count).find(|&o| self.view.node_id(o) == id)
    }

    /// Returns `None` when `id` doesn't name any node in this snapshot.
    pub fn class_name_for_object_id(&self, id: u32) -> Option<String> {
        let ordinal = self.node_id_to_ordinal(id)?;
        let class_index = self.view.class_index(ordinal);
        Some(self.view.string_at(class_index).to_string())
    }

    // ------------------------------------------------------------------
    // Aggregator
    // ------------------------------------------------------------------

    /// Build (or return the cached) per-class aggregate map for `key`.
    /// `key` is either `"allObjects"` or a synthetic filter key like
    /// `"NodeIdRange: a..b"`.
    pub fn get_aggregates_by_class_name(
        &mut self,
        sorted_indexes: bool,
        key: &str,
    ) -> &HashMap<u32, ClassAggregate> {
        if !self.aggregate_cache.contains_key(key) {
            let mut by_class = if key == "allObjects" {
                aggregate::build_aggregates(&self.view, &self.distances, &AllObjects)
            } else if let Some(filter) = parse_node_id_range_key(key) {
                aggregate::build_aggregates(&self.view, &self.distances, &filter)
            } else {
                aggregate::build_aggregates(&self.view, &self.distances, &AllObjects)
            };
            aggregate::fill_max_retained_size(&self.view, &self.dominated, &self.retained_sizes, &mut by_class);
            self.aggregate_cache.insert(key.to_string(), by_class);
        }

        let by_class = self.aggregate_cache.get_mut(key).unwrap();
        if sorted_indexes {
            for agg in by_class.values_mut() {
                agg.node_indexes
                    .sort_by_key(|&idx| self.view.node_id(self.view.index_to_ordinal(idx as u64)));
            }
        }
        self.aggregate_cache.get(key).unwrap()
    }

    // ------------------------------------------------------------------
    // Diff engine
    // ------------------------------------------------------------------

    /// Snapshot this engine's current aggregates, keyed by class name, for
    /// diffing against another engine's (or this engine's own, later)
    /// aggregates. Exposed so callers can diff two independently loaded
    /// snapshots directly with [`crate::diff::compute`].
    pub fn diff_snapshot(&mut self) -> DiffBase {
        self.current_diff_base()
    }

    fn current_diff_base(&mut self) -> DiffBase {
        let by_class = self.get_aggregates_by_class_name(true, "allObjects").clone();
        let mut by_class_name = HashMap::new();
        for (class_index, agg) in &by_class {
            let name = self.view.string_at(*class_index).to_string();
            if let Some(diffable) = aggregate::to_diff_snapshot(&self.view, &by_class, *class_index) {
                by_class_name.insert(name, diffable);
            }
        }
        DiffBase { by_class_name }
    }

    /// Snapshot this engine's current aggregates under `id`, for a later
    /// `diff_against` call.
    pub fn register_diff_base(&mut self, id: impl Into<String>) {
        let base = self.current_diff_base();
        self.diff_bases.insert(id.into(), base);
    }

    /// Diff the `id`-registered base against this engine's current state
    /// for one class name. Returns a [`QueryError::UnknownDiffBase`] if
    /// `id` was never registered.
    pub fn diff_against(&mut self, id: &str, class_name: &str) -> std::result::Result<Option<Diff>, QueryError> {
        let current = self.current_diff_base();
        let base = self
            .diff_bases
            .get(id)
            .ok_or_else(|| QueryError::UnknownDiffBase(id.to_string()))?;

        let empty = AggregateForDiff {
            ids: Vec::new(),
            indexes: Vec::new(),
            self_sizes: Vec::new(),
        };
        let a = base.by_class_name.get(class_name).unwrap_or(&empty);
        let b = current.by_class_name.get(class_name).unwrap_or(&empty);
        Ok(diff::compute(a, b))
    }

    // ------------------------------------------------------------------
    // Named filters
    // ------------------------------------------------------------------

    pub fn named_filter(&mut self, name: &str) -> std::result::Result<&NamedFilter, QueryError> {
        if !self.named_filter_cache.contains_key(name) {
            let filter = filters::create_named_filter(name, &self.view, &self.distances)?;
            self.named_filter_cache.insert(name.to_string(), filter);
        }
        Ok(self.named_filter_cache.get(name).unwrap())
    }

    // ------------------------------------------------------------------
    // Allocation profile
    // ------------------------------------------------------------------

    pub fn allocation_profile(&self) -> &dyn AllocationProfileSource {
        self.allocation_profile.as_ref()
    }

    pub fn node_count(&self) -> u64 {
        self.view.node_count
    }

    pub fn total_size(&self) -> f64 {
        self.static_data.total_size
    }

    pub fn has_distance(&self, ordinal: u64) -> bool {
        self.distances[ordinal as usize] != NO_DISTANCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::NullAllocationProfile;

    fn tiny_chain_raw() -> RawSnapshot {
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
        RawSnapshot::parse(json.as_bytes()).unwrap()
    }

    #[test]
    fn initialize_runs_every_pass_in_order() {
        let raw = tiny_chain_raw();
        let engine = Engine::initialize(&raw, Box::new(NullAllocationProfile), None).unwrap();
        assert_eq!(engine.retained_sizes[0], 30.0);
        assert_eq!(engine.dominators_tree[2], 1);
        assert_eq!(*engine.postorder.ordinal_of_postorder.last().unwrap(), engine.view.root_ordinal());
    }

    #[test]
    fn reset_clears_caches_not_derived_arrays() {
        let raw = tiny_chain_raw();
        let mut engine = Engine::initialize(&raw, Box::new(NullAllocationProfile), None).unwrap();
        engine.get_aggregates_by_class_name(false, "allObjects");
        assert!(!engine.aggregate_cache.is_empty());
        engine.reset();
        assert!(engine.aggregate_cache.is_empty());
        assert_eq!(engine.retained_sizes[0], 30.0);
    }

    #[test]
    fn diff_against_unknown_base_errors() {
        let raw = tiny_chain_raw();
        let mut engine = Engine::initialize(&raw, Box::new(NullAllocationProfile), None).unwrap();
        let err = engine.diff_against("nope", "Foo").unwrap_err();
        assert!(matches!(err, QueryError::UnknownDiffBase(_)));
    }

    #[test]
    fn serialize_node_round_trips_basic_fields() {
        let raw = tiny_chain_raw();
        let engine = Engine::initialize(&raw, Box::new(NullAllocationProfile), None).unwrap();
        let node = engine.serialize_node(1);
        assert_eq!(node.name, "A");
        assert_eq!(node.self_size, 10);
        assert_eq!(node.retained_size, 30.0);
    }

    #[test]
    fn cancelling_before_retainers_stops_initialize() {
        let raw = tiny_chain_raw();
        let result = Engine::initialize(&raw, Box::new(NullAllocationProfile), Some(&|| true));
        assert!(matches!(result, Err(EngineError::Cancelled { .. })));
    }
}
