//! Dominated-children indexer: two-pass bucket sort by
//! dominator ordinal, excluding root (which dominates itself).

use heapgraph_model::GraphView;

pub struct DominatedIndex {
    /// `first_dominated_node_index[dom_ordinal]`, `len = node_count + 1`.
    pub first_dominated_node_index: Vec<u64>,
    /// Flattened children buckets, `len = node_count - 1`.
    pub dominated_nodes: Vec<u32>,
}

pub fn build(view: &GraphView, dominators_tree: &[u64]) -> DominatedIndex {
    let node_count = view.node_count as usize;
    let root_ordinal = view.root_ordinal();

    let mut counts = vec![0u64; node_count + 1];
    for ordinal in 0..node_count as u64 {
        if ordinal == root_ordinal {
            continue;
        }
        counts[dominators_tree[ordinal as usize] as usize + 1] += 1;
    }
    for i in 1..counts.len() {
        counts[i] += counts[i - 1];
    }
    let first_dominated_node_index = counts.clone();

    let mut cursor = counts;
    let mut dominated_nodes = vec![0u32; node_count - 1];
    for ordinal in 0..node_count as u64 {
        if ordinal == root_ordinal {
            continue;
        }
        let dom = dominators_tree[ordinal as usize] as usize;
        let slot = cursor[dom];
        dominated_nodes[slot as usize] = ordinal as u32;
        cursor[dom] += 1;
    }

    DominatedIndex {
        first_dominated_node_index,
        dominated_nodes,
    }
}

impl DominatedIndex {
    pub fn children_of(&self, ordinal: u64) -> &[u32] {
        let start = self.first_dominated_node_index[ordinal as usize] as usize;
        let end = self.first_dominated_node_index[ordinal as usize + 1] as usize;
        &self.dominated_nodes[start..end]
    }
}
