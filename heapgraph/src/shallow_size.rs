//! Shallow-size reassignment.
//!
//! Transfers self-size from hidden/array nodes to their unique non-hidden,
//! non-array "owner". Consumes `&mut GraphView` once — re-running this
//! after the first pass would double-count, so
//! [`crate::engine::Engine::initialize`] is the only caller.

use heapgraph_model::{GraphView, NO_ENTRY};

use crate::error::{EngineError, Result};
use crate::distance::is_user_root;

const MULTIPLE: u32 = NO_ENTRY - 1;

/// Runs only when the snapshot has at least one user root (i.e. wasn't
/// captured with "expose internals"). No-op otherwise.
pub fn reassign(view: &mut GraphView) -> Result<()> {
    let node_count = view.node_count;
    if node_count >= 0xFFFF_FFFE {
        return Err(EngineError::NodeCountTooLarge(node_count));
    }

    let root_ordinal = view.root_ordinal();
    let has_user_root = view
        .edges_of(root_ordinal)
        .map(|e| view.edge_to_ordinal(e))
        .any(|t| is_user_root(view, t));
    if !has_user_root {
        return Ok(());
    }

    let mut owner = vec![NO_ENTRY; node_count as usize];
    let mut worklist = std::collections::VecDeque::new();

    for ordinal in 0..node_count {
        let type_name = view.node_type_name(ordinal);
        if type_name == "hidden" || type_name == "array" {
            owner[ordinal as usize] = NO_ENTRY;
        } else {
            owner[ordinal as usize] = ordinal as u32;
            worklist.push_back(ordinal);
        }
    }

    while let Some(ordinal) = worklist.pop_front() {
        let this_owner = owner[ordinal as usize];
        let targets: Vec<u64> = view
            .edges_of(ordinal)
            .filter(|&e| view.edge_type_name(e) != "weak")
            .map(|e| view.edge_to_ordinal(e))
            .collect();
        for target in targets {
            let slot = owner[target as usize];
            if slot == NO_ENTRY {
                owner[target as usize] = this_owner;
                worklist.push_back(target);
            } else if slot == this_owner || target == this_owner as u64 || slot == MULTIPLE {
                // no-op
            } else {
                owner[target as usize] = MULTIPLE;
                worklist.push_back(target);
            }
        }
    }

    for ordinal in 0..node_count {
        let owner_ordinal = owner[ordinal as usize];
        if owner_ordinal == NO_ENTRY || owner_ordinal == MULTIPLE {
            continue;
        }
        if owner_ordinal as u64 == ordinal {
            continue;
        }
        if owner_ordinal as u64 == root_ordinal {
            continue;
        }
        if view.node_type_name(owner_ordinal as u64) == "synthetic" {
            continue;
        }
        let size = view.node_self_size(ordinal);
        if size == 0 {
            continue;
        }
        view.set_node_self_size(ordinal, 0);
        let new_owner_size = view.node_self_size(owner_ordinal as u64) + size;
        view.set_node_self_size(owner_ordinal as u64, new_owner_size);
    }

    Ok(())
}
