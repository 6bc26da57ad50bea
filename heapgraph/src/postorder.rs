//! Post-order indexer.
//!
//! Iterative DFS over essential edges, gated by the page-ownership filter,
//! with two best-effort recovery rounds so every node ends up placed even
//! when the main traversal can't reach it.

use heapgraph_model::GraphView;

use crate::error::{EngineError, Result};
use crate::essential::{EssentialEdgeCache, is_essential};
use crate::page_gate;
use crate::retainers::retainers_of;

#[derive(Debug, Default)]
pub struct StructuralWarnings {
    pub only_weak_retainers: Vec<u64>,
    pub unreachable: Vec<u64>,
}

impl StructuralWarnings {
    const CAP: usize = 100;

    fn push_weak(&mut self, ordinal: u64) {
        if self.only_weak_retainers.len() < Self::CAP {
            self.only_weak_retainers.push(ordinal);
        }
    }

    fn push_unreachable(&mut self, ordinal: u64) {
        if self.unreachable.len() < Self::CAP {
            self.unreachable.push(ordinal);
        }
    }
}

pub struct PostorderResult {
    /// `ordinal_of_postorder[i]` — the node ordinal emitted at post-order index `i`.
    pub ordinal_of_postorder: Vec<u64>,
    /// Inverse map: `postorder_of_ordinal[ordinal]`.
    pub postorder_of_ordinal: Vec<u64>,
    pub warnings: StructuralWarnings,
}

/// Nodes all of whose retainers are weak or shortcut edges (used by
/// recovery round 2).
fn has_only_weak_retainers(view: &GraphView, ordinal: u64) -> bool {
    let mut any = false;
    for (_src, edge_index) in retainers_of(view, ordinal) {
        any = true;
        let ty = view.edge_type_name(edge_index as u64);
        if ty != "weak" && ty != "shortcut" {
            return false;
        }
    }
    any
}

pub fn build(view: &GraphView) -> Result<PostorderResult> {
    let node_count = view.node_count as usize;
    let root_ordinal = view.root_ordinal();
    let mut visited = vec![false; node_count];
    let mut ordinal_of_postorder = Vec::with_capacity(node_count);
    let mut cache = EssentialEdgeCache::new(view.strings().len());
    let mut warnings = StructuralWarnings::default();

    run_dfs(view, root_ordinal, &mut visited, &mut ordinal_of_postorder, &mut cache);

    // Round 2: push nodes whose retainers are all weak/shortcut.
    if ordinal_of_postorder.len() < node_count {
        for ordinal in 0..view.node_count {
            if !visited[ordinal as usize] && has_only_weak_retainers(view, ordinal) {
                warnings.push_weak(ordinal);
                run_dfs(view, ordinal, &mut visited, &mut ordinal_of_postorder, &mut cache);
            }
        }
    }

    // Round 3: whatever is still unreached goes in arbitrary order.
    if ordinal_of_postorder.len() < node_count {
        for ordinal in 0..view.node_count {
            if ordinal != root_ordinal && !visited[ordinal as usize] {
                warnings.push_unreachable(ordinal);
                visited[ordinal as usize] = true;
                ordinal_of_postorder.push(ordinal);
            }
        }
    }

    // Root must be last.
    if !visited[root_ordinal as usize] {
        visited[root_ordinal as usize] = true;
        ordinal_of_postorder.push(root_ordinal);
    } else if ordinal_of_postorder.last().copied() != Some(root_ordinal) {
        if let Some(pos) = ordinal_of_postorder.iter().position(|&o| o == root_ordinal) {
            ordinal_of_postorder.remove(pos);
        }
        ordinal_of_postorder.push(root_ordinal);
    }

    if *ordinal_of_postorder.last().unwrap() != root_ordinal
        || ordinal_of_postorder.len() != node_count
    {
        return Err(EngineError::RootNotLastInPostorder {
            got: ordinal_of_postorder.len() as u64 - 1,
            expected: node_count as u64 - 1,
        });
    }

    let mut postorder_of_ordinal = vec![0u64; node_count];
    for (post_idx, &ordinal) in ordinal_of_postorder.iter().enumerate() {
        postorder_of_ordinal[ordinal as usize] = post_idx as u64;
    }

    Ok(PostorderResult {
        ordinal_of_postorder,
        postorder_of_ordinal,
        warnings,
    })
}

struct Frame {
    ordinal: u64,
    cursor_slot: u64,
    end_slot: u64,
}

fn run_dfs(
    view: &GraphView,
    start: u64,
    visited: &mut [bool],
    order: &mut Vec<u64>,
    cache: &mut EssentialEdgeCache,
) {
    if visited[start as usize] {
        return;
    }
    let root_ordinal = view.root_ordinal();
    let ef = view.meta.edge_field_count as u64;
    let (start_slot, end_slot) = view.node_edge_range(start);
    visited[start as usize] = true;
    let mut stack = vec![Frame {
        ordinal: start,
        cursor_slot: start_slot,
        end_slot,
    }];

    while let Some(frame) = stack.last_mut() {
        if frame.cursor_slot >= frame.end_slot {
            order.push(frame.ordinal);
            stack.pop();
            continue;
        }
        let edge_index = frame.cursor_slot * ef;
        frame.cursor_slot += 1;
        let src = frame.ordinal;

        if !is_essential(view, root_ordinal, src, edge_index, cache) {
            continue;
        }
        let target = view.edge_to_ordinal(edge_index);
        if page_gate::skip_edge(view, root_ordinal, src, target) {
            continue;
        }
        if visited[target as usize] {
            continue;
        }
        visited[target as usize] = true;
        let (t_start, t_end) = view.node_edge_range(target);
        stack.push(Frame {
            ordinal: target,
            cursor_slot: t_start,
            end_slot: t_end,
        });
    }
}
