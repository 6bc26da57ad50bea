//! Retained-size propagator: one linear post-order sweep.

use heapgraph_model::GraphView;

use crate::postorder::PostorderResult;

/// `retained_sizes[v]`, f64 since native heaps routinely exceed 2^31 bytes
/// at the aggregate level.
pub fn compute(view: &GraphView, postorder: &PostorderResult, dominators_tree: &[u64]) -> Vec<f64> {
    let node_count = view.node_count as usize;
    let mut retained = vec![0.0f64; node_count];
    for ordinal in 0..node_count as u64 {
        retained[ordinal as usize] = view.node_self_size(ordinal) as f64;
    }

    for post_idx in 0..(node_count - 1) as u64 {
        let ordinal = postorder.ordinal_of_postorder[post_idx as usize];
        let dom = dominators_tree[ordinal as usize];
        retained[dom as usize] += retained[ordinal as usize];
    }

    retained
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dominators, page_gate, postorder};
    use heapgraph_model::RawSnapshot;

    #[test]
    fn s1_tiny_chain_retained_sizes() {
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
        let mut view = GraphView::build(&raw).unwrap();
        page_gate::compute(&mut view);
        let post = postorder::build(&view).unwrap();
        let dom = dominators::build(&view, &post);
        let retained = compute(&view, &post, &dom);
        assert_eq!(retained[0], 30.0);
        assert_eq!(retained[1], 30.0);
        assert_eq!(retained[2], 20.0);
    }
}
