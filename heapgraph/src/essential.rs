//! Essential-edge predicate: shared policy consumed by the
//! distance, post-order and dominator passes.

use heapgraph_model::GraphView;
use once_cell::sync::Lazy;
use regex::Regex;

static WEAKMAP_PAIR_EDGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\d+( / part of key \(.*? @\d+\) -> value \(.*? @\d+\) pair in WeakMap \(table @(?P<table_id>\d+)\))$",
    )
    .expect("static WeakMap edge pattern is valid")
});

/// Caches negative WeakMap-pattern matches by edge name string index, so a
/// string that never matches the pattern is never re-parsed.
#[derive(Debug, Default)]
pub struct EssentialEdgeCache {
    checked: Vec<bool>,
    non_weakmap: Vec<bool>,
}

impl EssentialEdgeCache {
    pub fn new(string_count: usize) -> Self {
        EssentialEdgeCache {
            checked: vec![false; string_count],
            non_weakmap: vec![false; string_count],
        }
    }

    fn is_known_non_weakmap(&self, string_index: u32) -> Option<bool> {
        let i = string_index as usize;
        if i < self.checked.len() && self.checked[i] {
            Some(self.non_weakmap[i])
        } else {
            None
        }
    }

    fn record(&mut self, string_index: u32, non_weakmap: bool) {
        let i = string_index as usize;
        if i >= self.checked.len() {
            self.checked.resize(i + 1, false);
            self.non_weakmap.resize(i + 1, false);
        }
        self.checked[i] = true;
        self.non_weakmap[i] = non_weakmap;
    }
}

/// Determines whether an edge participates in dominator/post-order
/// computation.
pub fn is_essential(
    view: &GraphView,
    root_ordinal: u64,
    src_ordinal: u64,
    edge_index: u64,
    cache: &mut EssentialEdgeCache,
) -> bool {
    let edge_type = view.edge_type_name(edge_index);
    match edge_type {
        "weak" => false,
        "shortcut" => src_ordinal == root_ordinal,
        "internal" => is_essential_internal(view, src_ordinal, edge_index, cache),
        _ => true,
    }
}

fn is_essential_internal(
    view: &GraphView,
    src_ordinal: u64,
    edge_index: u64,
    cache: &mut EssentialEdgeCache,
) -> bool {
    let name_index = view.edge_name_or_index(edge_index);
    if let Some(non_weakmap) = cache.is_known_non_weakmap(name_index) {
        if non_weakmap {
            return true;
        }
    }

    let name = view.string_at(name_index);
    let table_id = match WEAKMAP_PAIR_EDGE.captures(name) {
        Some(caps) => caps.name("table_id").and_then(|m| m.as_str().parse::<u32>().ok()),
        None => {
            cache.record(name_index, true);
            return true;
        }
    };

    match table_id {
        Some(table_id) => {
            cache.record(name_index, false);
            view.node_id(src_ordinal) != table_id
        }
        None => {
            cache.record(name_index, true);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_weakmap_pair_name() {
        let name = "0 / part of key (K @5) -> value (V @7) pair in WeakMap (table @3)";
        let caps = WEAKMAP_PAIR_EDGE.captures(name).unwrap();
        assert_eq!(caps.name("table_id").unwrap().as_str(), "3");
    }

    #[test]
    fn non_matching_name_is_not_weakmap() {
        assert!(WEAKMAP_PAIR_EDGE.captures("plain edge name").is_none());
    }

    #[test]
    fn cache_records_and_recalls() {
        let mut cache = EssentialEdgeCache::new(4);
        assert_eq!(cache.is_known_non_weakmap(2), None);
        cache.record(2, true);
        assert_eq!(cache.is_known_non_weakmap(2), Some(true));
    }
}
