//! Dominator builder: the iterative Cooper-Harvey-Kennedy
//! algorithm over the reverse graph, indexed by post-order number.

use heapgraph_model::{GraphView, NO_ENTRY};

use crate::essential::{EssentialEdgeCache, is_essential};
use crate::page_gate;
use crate::postorder::PostorderResult;
use crate::retainers::retainers_of;

/// An essential retainer of `ordinal`, expressed as the retaining node's
/// post-order index, or `None` if the retaining edge isn't essential or is
/// excluded by the page-ownership gate.
fn essential_retainer_post_indices(
    view: &GraphView,
    postorder: &PostorderResult,
    root_ordinal: u64,
    ordinal: u64,
    cache: &mut EssentialEdgeCache,
) -> Vec<u64> {
    let mut out = Vec::new();
    for (src_node_index, edge_index) in retainers_of(view, ordinal) {
        let src_ordinal = view.index_to_ordinal(src_node_index as u64);
        if !is_essential(view, root_ordinal, src_ordinal, edge_index as u64, cache) {
            continue;
        }
        if page_gate::skip_edge(view, root_ordinal, src_ordinal, ordinal) {
            continue;
        }
        out.push(postorder.postorder_of_ordinal[src_ordinal as usize]);
    }
    out
}

fn intersect(dom_by_post: &[u64], mut a: u64, mut b: u64) -> u64 {
    while a != b {
        while a < b {
            a = dom_by_post[a as usize];
        }
        while b < a {
            b = dom_by_post[b as usize];
        }
    }
    a
}

/// Returns `dominators_tree` indexed by node ordinal.
pub fn build(view: &GraphView, postorder: &PostorderResult) -> Vec<u64> {
    let node_count = view.node_count as usize;
    let root_ordinal = view.root_ordinal();
    let root_post_idx = postorder.postorder_of_ordinal[root_ordinal as usize];

    let mut dom_by_post = vec![NO_ENTRY; node_count];
    dom_by_post[root_post_idx as usize] = root_post_idx;

    let mut cache = EssentialEdgeCache::new(view.strings().len());
    let mut affected = vec![false; node_count];

    for edge_index in view.edges_of(root_ordinal) {
        if !is_essential(view, root_ordinal, root_ordinal, edge_index, &mut cache) {
            continue;
        }
        let target = view.edge_to_ordinal(edge_index);
        if page_gate::skip_edge(view, root_ordinal, root_ordinal, target) {
            continue;
        }
        affected[postorder.postorder_of_ordinal[target as usize] as usize] = true;
    }

    let mut changed = true;
    while changed {
        changed = false;
        for post_idx in (0..node_count as u64).rev() {
            if post_idx == root_post_idx || !affected[post_idx as usize] {
                continue;
            }
            affected[post_idx as usize] = false;
            let ordinal = postorder.ordinal_of_postorder[post_idx as usize];
            let retainer_posts =
                essential_retainer_post_indices(view, postorder, root_ordinal, ordinal, &mut cache);

            let mut new_dom = NO_ENTRY;
            for rp in retainer_posts {
                if dom_by_post[rp as usize] == NO_ENTRY {
                    continue;
                }
                new_dom = match new_dom {
                    NO_ENTRY => rp,
                    existing => intersect(&dom_by_post, existing, rp),
                };
            }
            if new_dom == NO_ENTRY {
                new_dom = root_post_idx;
            }

            if dom_by_post[post_idx as usize] != new_dom {
                dom_by_post[post_idx as usize] = new_dom;
                changed = true;
                for edge_index in view.edges_of(ordinal) {
                    if !is_essential(view, root_ordinal, ordinal, edge_index, &mut cache) {
                        continue;
                    }
                    let target = view.edge_to_ordinal(edge_index);
                    if page_gate::skip_edge(view, root_ordinal, ordinal, target) {
                        continue;
                    }
                    affected[postorder.postorder_of_ordinal[target as usize] as usize] = true;
                }
            }
        }
    }

    let mut dominators_tree = vec![0u64; node_count];
    for ordinal in 0..node_count as u64 {
        let post_idx = postorder.postorder_of_ordinal[ordinal as usize];
        let dom_post_idx = dom_by_post[post_idx as usize];
        dominators_tree[ordinal as usize] = postorder.ordinal_of_postorder[dom_post_idx as usize];
    }
    dominators_tree
}
