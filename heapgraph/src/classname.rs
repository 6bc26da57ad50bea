//! Class-name assigner.
//!
//! Runs after DOM propagation so object names already carry any "Detached "
//! prefix. Writes the class index into the upper 30 bits of the packed
//! detachedness field via [`heapgraph_model::GraphView::set_class_index`].

use std::collections::HashMap;

use heapgraph_model::GraphView;

/// Local interning cache so repeated class names map to the same string
/// index; shared with `duplicatedStrings`/DOM filters via
/// [`crate::error::Result`]-free helpers since class assignment can't fail
/// except on the 30-bit overflow the graph view itself checks.
#[derive(Default)]
pub struct ClassNameCache {
    by_text: HashMap<String, u32>,
}

impl ClassNameCache {
    fn intern(&mut self, view: &mut GraphView, text: String) -> u32 {
        if let Some(&idx) = self.by_text.get(&text) {
            return idx;
        }
        let idx = view.intern_string(text.clone());
        self.by_text.insert(text, idx);
        idx
    }
}

pub fn assign(view: &mut GraphView) -> crate::error::Result<()> {
    let node_count = view.node_count;
    let mut cache = ClassNameCache::default();

    for ordinal in 0..node_count {
        let class_index = class_index_for(view, ordinal, &mut cache);
        view.set_class_index(ordinal, class_index)?;
    }
    Ok(())
}

fn class_index_for(view: &mut GraphView, ordinal: u64, cache: &mut ClassNameCache) -> u32 {
    let type_name = view.node_type_name(ordinal).to_string();
    match type_name.as_str() {
        "hidden" => cache.intern(view, "(system)".to_string()),
        "code" => cache.intern(view, "(compiled code)".to_string()),
        "closure" => cache.intern(view, "Function".to_string()),
        "regexp" => cache.intern(view, "RegExp".to_string()),
        "object" | "native" => {
            let name = view.node_name(ordinal).to_string();
            if let Some(rest) = name.strip_prefix("Detached <") {
                if let Some(space) = rest.find(' ') {
                    let truncated = format!("Detached <{}>", &rest[..space]);
                    return cache.intern(view, truncated);
                }
                cache.intern(view, name)
            } else if let Some(rest) = name.strip_prefix('<') {
                if let Some(space) = rest.find(' ') {
                    let truncated = format!("<{}>", &rest[..space]);
                    return cache.intern(view, truncated);
                }
                view.node_name_string_index(ordinal)
            } else {
                view.node_name_string_index(ordinal)
            }
        }
        other => cache.intern(view, format!("({other})")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapgraph_model::RawSnapshot;

    fn view_with(node_type: usize, name: &str) -> GraphView {
        let json = format!(
            r#"{{
            "snapshot": {{
                "meta": {{
                    "node_fields": ["type", "name", "id", "self_size", "edge_count"],
                    "node_types": [["synthetic", "object", "hidden", "code", "closure", "regexp", "native"], "string", "number", "number", "number"],
                    "edge_fields": ["type", "name_or_index", "to_node"],
                    "edge_types": [["property"], "string_or_number", "node"]
                }},
                "node_count": 1,
                "edge_count": 0
            }},
            "nodes": [{node_type},0,1,0,0],
            "edges": [],
            "strings": ["{name}"]
        }}"#
        );
        let raw = RawSnapshot::parse(json.as_bytes()).unwrap();
        GraphView::build(&raw).unwrap()
    }

    #[test]
    fn hidden_nodes_get_system_class() {
        let mut view = view_with(2, "whatever");
        assign(&mut view).unwrap();
        let idx = view.class_index(0);
        assert_eq!(view.string_at(idx), "(system)");
    }

    #[test]
    fn bracketed_object_name_is_truncated() {
        let mut view = view_with(1, "<Foo bar baz>");
        assign(&mut view).unwrap();
        let idx = view.class_index(0);
        assert_eq!(view.string_at(idx), "<Foo>");
    }

    #[test]
    fn plain_object_name_reuses_existing_index() {
        let mut view = view_with(1, "MyObject");
        let before = view.node_name_string_index(0);
        assign(&mut view).unwrap();
        let idx = view.class_index(0);
        assert_eq!(idx, before);
    }
}
