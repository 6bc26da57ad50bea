//! Typed packed graph view over the flat `nodes`/`edges` arrays.
//!
//! `GraphView` is the single owner of every array the engine builds.
//! Accessors are plain index arithmetic over [`PagedU32Array`]s — nothing
//! here allocates. Node/edge references ([`NodeRef`]/[`EdgeRef`]) are
//! lightweight values pairing a `&GraphView` with an index, so cyclic graph
//! structure never needs owned back-references.

use crate::meta::SnapshotMeta;
use crate::paged::PagedU32Array;
use crate::raw::{ModelError, RawSnapshot, Result};
use crate::{DomLinkState, flags};

/// Where the packed `detachedness_and_class_index` word lives for a given
/// snapshot: reused in place inside the node record when
/// the schema declares a `detachedness` field, or a parallel array sized
/// to `node_count` otherwise.
#[derive(Debug)]
enum DetachClassStorage {
    InNode { offset: usize },
    Parallel(PagedU32Array),
}

#[derive(Debug)]
pub struct GraphView {
    pub meta: SnapshotMeta,
    pub node_count: u64,
    pub edge_count: u64,
    pub root_index: u64,

    nodes: PagedU32Array,
    edges: PagedU32Array,
    strings: Vec<String>,
    locations: Vec<u32>,
    samples: Vec<u32>,

    /// `first_edge_indexes[ordinal]`, prefix sum, `len = node_count + 1`.
    pub first_edge_indexes: Vec<u64>,

    /// Reverse-edge arrays, sized to `edge_count` and filled in place by
    /// `heapgraph::retainers::build`.
    pub retaining_nodes: PagedU32Array,
    pub retaining_edges: PagedU32Array,
    /// `first_retainer_index[ordinal]`, prefix sum, `len = node_count + 1`.
    pub first_retainer_index: Vec<u64>,

    /// `flags[ordinal]` bitset.
    pub node_flags: Vec<u32>,

    detach_class: DetachClassStorage,
    has_detachedness: bool,
}

impl GraphView {
    /// Build a [`GraphView`] from a parsed `.heapsnapshot` document. This
    /// lays out every array a fully-analyzed snapshot needs but does not run
    /// any of the analysis passes (retainers, distances, dominators, ...) —
    /// those are `heapgraph::engine::Engine::initialize`'s job.
    pub fn build(raw: &RawSnapshot) -> Result<Self> {
        let meta = raw.meta()?;
        let node_count = raw.node_count();
        let edge_count = raw.edge_count();
        let nodes = raw.nodes();
        let edges = raw.edges();
        let root_index = raw.root_index()?;

        let nf = meta.node_field_count as u64;
        let mut first_edge_indexes = Vec::with_capacity(node_count as usize + 1);
        let mut cursor = 0u64;
        for ordinal in 0..node_count {
            first_edge_indexes.push(cursor);
            let edge_count_field = nodes.get(ordinal * nf + meta.node_edge_count_offset as u64);
            cursor += edge_count_field as u64;
        }
        first_edge_indexes.push(cursor);
        if cursor != edge_count {
            tracing::warn!(
                sum_edge_count = cursor,
                declared_edge_count = edge_count,
                "sum(node.edge_count) does not match edge_count"
            );
        }

        let has_detachedness = meta.node_detachedness_offset.is_some();
        let detach_class = match meta.node_detachedness_offset {
            Some(offset) => DetachClassStorage::InNode { offset },
            None => DetachClassStorage::Parallel(PagedU32Array::zeroed(node_count)),
        };

        Ok(GraphView {
            meta,
            node_count,
            edge_count,
            root_index,
            nodes,
            edges,
            strings: raw.strings().to_vec(),
            locations: raw.locations().to_vec(),
            samples: raw.samples().to_vec(),
            first_edge_indexes,
            retaining_nodes: PagedU32Array::zeroed(edge_count),
            retaining_edges: PagedU32Array::zeroed(edge_count),
            first_retainer_index: vec![0u64; node_count as usize + 1],
            node_flags: vec![0u32; node_count as usize],
            detach_class,
            has_detachedness,
        })
    }

    pub fn has_detachedness(&self) -> bool {
        self.has_detachedness
    }

    pub fn root_ordinal(&self) -> u64 {
        self.root_index / self.meta.node_field_count as u64
    }

    pub fn ordinal_to_index(&self, ordinal: u64) -> u64 {
        ordinal * self.meta.node_field_count as u64
    }

    pub fn index_to_ordinal(&self, node_index: u64) -> u64 {
        node_index / self.meta.node_field_count as u64
    }

    // ------------------------------------------------------------------
    // Node field accessors
    // ------------------------------------------------------------------

    #[inline]
    pub fn get_node_field(&self, ordinal: u64, offset: usize) -> u32 {
        self.nodes
            .get(ordinal * self.meta.node_field_count as u64 + offset as u64)
    }

    #[inline]
    pub fn set_node_field(&mut self, ordinal: u64, offset: usize, value: u32) {
        self.nodes
            .set(ordinal * self.meta.node_field_count as u64 + offset as u64, value);
    }

    pub fn node_type_id(&self, ordinal: u64) -> u32 {
        self.get_node_field(ordinal, self.meta.node_type_offset)
    }

    pub fn node_type_name(&self, ordinal: u64) -> &str {
        self.meta.node_type_name(self.node_type_id(ordinal))
    }

    pub fn node_name_string_index(&self, ordinal: u64) -> u32 {
        self.get_node_field(ordinal, self.meta.node_name_offset)
    }

    pub fn node_name(&self, ordinal: u64) -> &str {
        self.string_at(self.node_name_string_index(ordinal))
    }

    pub fn set_node_name_string_index(&mut self, ordinal: u64, string_index: u32) {
        self.set_node_field(ordinal, self.meta.node_name_offset, string_index);
    }

    pub fn node_id(&self, ordinal: u64) -> u32 {
        self.get_node_field(ordinal, self.meta.node_id_offset)
    }

    pub fn node_self_size(&self, ordinal: u64) -> u32 {
        self.get_node_field(ordinal, self.meta.node_self_size_offset)
    }

    pub fn set_node_self_size(&mut self, ordinal: u64, value: u32) {
        self.set_node_field(ordinal, self.meta.node_self_size_offset, value);
    }

    pub fn node_edge_count(&self, ordinal: u64) -> u32 {
        self.get_node_field(ordinal, self.meta.node_edge_count_offset)
    }

    pub fn node_trace_node_id(&self, ordinal: u64) -> Option<u32> {
        self.meta
            .node_trace_node_id_offset
            .map(|off| self.get_node_field(ordinal, off))
    }

    /// Node's edge-index range `[start, end)` into the `edges` array.
    pub fn node_edge_range(&self, ordinal: u64) -> (u64, u64) {
        (
            self.first_edge_indexes[ordinal as usize],
            self.first_edge_indexes[ordinal as usize + 1],
        )
    }

    pub fn edges_of(&self, ordinal: u64) -> impl Iterator<Item = u64> + '_ {
        let (start, end) = self.node_edge_range(ordinal);
        let ef = self.meta.edge_field_count as u64;
        (start..end).map(move |slot| slot * ef)
    }

    // ------------------------------------------------------------------
    // Packed detachedness + class index
    // ------------------------------------------------------------------

    fn detach_class_word(&self, ordinal: u64) -> u32 {
        match &self.detach_class {
            DetachClassStorage::InNode { offset } => self.get_node_field(ordinal, *offset),
            DetachClassStorage::Parallel(arr) => arr.get(ordinal),
        }
    }

    fn set_detach_class_word(&mut self, ordinal: u64, value: u32) {
        match &mut self.detach_class {
            DetachClassStorage::InNode { offset } => {
                let offset = *offset;
                self.set_node_field(ordinal, offset, value)
            }
            DetachClassStorage::Parallel(arr) => arr.set(ordinal, value),
        }
    }

    pub fn dom_link_state(&self, ordinal: u64) -> DomLinkState {
        DomLinkState::from_bits(self.detach_class_word(ordinal))
    }

    pub fn set_dom_link_state(&mut self, ordinal: u64, state: DomLinkState) {
        let class = self.class_index(ordinal);
        self.set_detach_class_word(ordinal, (class << 2) | state.to_bits());
    }

    pub fn class_index(&self, ordinal: u64) -> u32 {
        self.detach_class_word(ordinal) >> 2
    }

    /// Set the class index, failing if it would overflow the 30 bits
    /// reserved for it.
    pub fn set_class_index(&mut self, ordinal: u64, class_index: u32) -> std::result::Result<(), ModelError> {
        if class_index >= (1 << 30) {
            return Err(ModelError::ClassIndexOverflow(class_index));
        }
        let link = self.dom_link_state(ordinal).to_bits();
        self.set_detach_class_word(ordinal, (class_index << 2) | link);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Edge field accessors
    // ------------------------------------------------------------------

    #[inline]
    pub fn get_edge_field(&self, edge_index: u64, offset: usize) -> u32 {
        self.edges.get(edge_index + offset as u64)
    }

    #[inline]
    pub fn set_edge_field(&mut self, edge_index: u64, offset: usize, value: u32) {
        self.edges.set(edge_index + offset as u64, value);
    }

    pub fn edge_type_id(&self, edge_index: u64) -> u32 {
        self.get_edge_field(edge_index, self.meta.edge_type_offset)
    }

    pub fn edge_type_name(&self, edge_index: u64) -> &str {
        self.meta.edge_type_name(self.edge_type_id(edge_index))
    }

    pub fn edge_name_or_index(&self, edge_index: u64) -> u32 {
        self.get_edge_field(edge_index, self.meta.edge_name_or_index_offset)
    }

    pub fn edge_to_node_index(&self, edge_index: u64) -> u32 {
        self.get_edge_field(edge_index, self.meta.edge_to_node_offset)
    }

    pub fn edge_to_ordinal(&self, edge_index: u64) -> u64 {
        self.index_to_ordinal(self.edge_to_node_index(edge_index) as u64)
    }

    /// Source node ordinal of an edge, computed by locating which node's
    /// edge range contains `edge_index` (edges are stored contiguously per
    /// source node, see `first_edge_indexes`).
    pub fn edge_source_ordinal(&self, edge_slot: u64) -> u64 {
        match self.first_edge_indexes.binary_search(&edge_slot) {
            Ok(i) => i as u64,
            Err(i) => (i - 1) as u64,
        }
    }

    // ------------------------------------------------------------------
    // Strings (append-only during initialization)
    // ------------------------------------------------------------------

    pub fn string_at(&self, index: u32) -> &str {
        self.strings.get(index as usize).map(String::as_str).unwrap_or("")
    }

    pub fn intern_string(&mut self, s: String) -> u32 {
        if let Some(pos) = self.strings.iter().position(|existing| existing == &s) {
            return pos as u32;
        }
        self.strings.push(s);
        (self.strings.len() - 1) as u32
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    // ------------------------------------------------------------------
    // Locations / samples
    // ------------------------------------------------------------------

    pub fn location_for_node(&self, ordinal: u64) -> Option<LocationRef<'_>> {
        let lf = self.meta.location_field_count;
        if lf == 0 {
            return None;
        }
        let node_index_offset = self.meta.location_node_index_offset?;
        let target = self.ordinal_to_index(ordinal) as u32;
        let count = self.locations.len() / lf;
        for i in 0..count {
            let base = i * lf;
            if self.locations[base + node_index_offset] == target {
                return Some(LocationRef { view: self, base });
            }
        }
        None
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn sample_timestamp_us(&self, index: usize) -> u32 {
        self.samples[index * 2]
    }

    pub fn sample_last_assigned_id(&self, index: usize) -> u32 {
        self.samples[index * 2 + 1]
    }

    // ------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------

    pub fn flag(&self, ordinal: u64, bit: u32) -> bool {
        self.node_flags[ordinal as usize] & bit != 0
    }

    pub fn set_flag(&mut self, ordinal: u64, bit: u32) {
        self.node_flags[ordinal as usize] |= bit;
    }

    pub fn is_page_object(&self, ordinal: u64) -> bool {
        self.flag(ordinal, flags::PAGE_OBJECT)
    }

    // ------------------------------------------------------------------
    // Node/edge view wrappers
    // ------------------------------------------------------------------

    pub fn node(&self, ordinal: u64) -> NodeRef<'_> {
        NodeRef { view: self, ordinal }
    }

    pub fn edge(&self, edge_index: u64) -> EdgeRef<'_> {
        EdgeRef { view: self, edge_index }
    }

    pub fn nodes_iter(&self) -> impl Iterator<Item = NodeRef<'_>> {
        (0..self.node_count).map(move |o| self.node(o))
    }
}

/// Lightweight read-only handle to one node.
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    view: &'a GraphView,
    pub ordinal: u64,
}

impl<'a> NodeRef<'a> {
    pub fn type_name(&self) -> &'a str {
        self.view.node_type_name(self.ordinal)
    }
    pub fn name(&self) -> &'a str {
        self.view.node_name(self.ordinal)
    }
    pub fn id(&self) -> u32 {
        self.view.node_id(self.ordinal)
    }
    pub fn self_size(&self) -> u32 {
        self.view.node_self_size(self.ordinal)
    }
    pub fn edge_count(&self) -> u32 {
        self.view.node_edge_count(self.ordinal)
    }
    pub fn edges(&self) -> impl Iterator<Item = EdgeRef<'a>> + 'a {
        let view = self.view;
        view.edges_of(self.ordinal).map(move |idx| view.edge(idx))
    }
}

/// Lightweight read-only handle to one edge.
#[derive(Debug, Clone, Copy)]
pub struct EdgeRef<'a> {
    view: &'a GraphView,
    pub edge_index: u64,
}

impl<'a> EdgeRef<'a> {
    pub fn type_name(&self) -> &'a str {
        self.view.edge_type_name(self.edge_index)
    }
    pub fn name_or_index(&self) -> u32 {
        self.view.edge_name_or_index(self.edge_index)
    }
    pub fn to_node_index(&self) -> u32 {
        self.view.edge_to_node_index(self.edge_index)
    }
    pub fn to_ordinal(&self) -> u64 {
        self.view.edge_to_ordinal(self.edge_index)
    }
}

/// Read-only handle to one `locations` record.
#[derive(Debug, Clone, Copy)]
pub struct LocationRef<'a> {
    view: &'a GraphView,
    base: usize,
}

impl<'a> LocationRef<'a> {
    pub fn script_id(&self) -> Option<u32> {
        self.view
            .meta
            .location_script_id_offset
            .map(|off| self.view.locations[self.base + off])
    }
    pub fn line(&self) -> Option<u32> {
        self.view
            .meta
            .location_line_offset
            .map(|off| self.view.locations[self.base + off])
    }
    pub fn column(&self) -> Option<u32> {
        self.view
            .meta
            .location_column_offset
            .map(|off| self.view.locations[self.base + off])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> RawSnapshot {
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
            "nodes": [
                0, 0, 1, 0, 2, 0,
                1, 1, 3, 10, 1, 0,
                1, 2, 5, 20, 0, 0
            ],
            "edges": [0, 1, 6, 0, 2, 12],
            "strings": ["GC roots", "A", "B"]
        }"#;
        serde_json::from_str::<serde_json::Value>(json).unwrap();
        RawSnapshot::parse(json.as_bytes()).unwrap()
    }

    #[test]
    fn node_field_accessors() {
        let raw = sample_raw();
        let view = GraphView::build(&raw).unwrap();
        assert_eq!(view.node_count, 3);
        assert_eq!(view.node_name(0), "GC roots");
        assert_eq!(view.node_name(1), "A");
        assert_eq!(view.node_self_size(1), 10);
        assert_eq!(view.node_edge_count(0), 2);
        assert_eq!(view.first_edge_indexes, vec![0, 2, 2, 2]);
    }

    #[test]
    fn edge_field_accessors() {
        let raw = sample_raw();
        let view = GraphView::build(&raw).unwrap();
        let edges: Vec<u64> = view.edges_of(0).collect();
        assert_eq!(edges, vec![0, 3]);
        assert_eq!(view.edge_to_ordinal(0), 1);
        assert_eq!(view.edge_to_ordinal(3), 2);
    }

    #[test]
    fn class_index_packing_roundtrips() {
        let raw = sample_raw();
        let mut view = GraphView::build(&raw).unwrap();
        assert!(!view.has_detachedness());
        view.set_class_index(1, 12345).unwrap();
        view.set_dom_link_state(1, DomLinkState::Detached);
        assert_eq!(view.class_index(1), 12345);
        assert!(matches!(view.dom_link_state(1), DomLinkState::Detached));
    }

    #[test]
    fn string_interning_dedupes() {
        let raw = sample_raw();
        let mut view = GraphView::build(&raw).unwrap();
        let a = view.intern_string("A".to_string());
        let c = view.intern_string("brand new".to_string());
        assert_eq!(a, 1);
        assert_eq!(view.string_at(c), "brand new");
    }
}
