//! Allocation-profile attribution is consumed as a black box:
//! building the allocation-profile tree itself is out of scope; the engine
//! only needs these four operations to attribute retained memory to
//! allocation sites.

pub trait AllocationProfileSource {
    /// Every trace node id associated with a given (JS) node id.
    fn trace_ids(&self, node_id: u32) -> Vec<u32>;
    /// Serialized top-of-stack entries across the whole trace tree.
    fn serialize_trace_tops(&self) -> serde_json::Value;
    /// Serialized caller chain for a given node id.
    fn serialize_callers(&self, node_id: u32) -> serde_json::Value;
    /// Serialized allocation stack for a given node id.
    fn serialize_allocation_stack(&self, node_id: u32) -> serde_json::Value;
}

/// Used for snapshots with no trace data (no `trace_function_infos`, empty
/// `trace_tree`).
pub struct NullAllocationProfile;

impl AllocationProfileSource for NullAllocationProfile {
    fn trace_ids(&self, _node_id: u32) -> Vec<u32> {
        Vec::new()
    }
    fn serialize_trace_tops(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
    fn serialize_callers(&self, _node_id: u32) -> serde_json::Value {
        serde_json::Value::Null
    }
    fn serialize_allocation_stack(&self, _node_id: u32) -> serde_json::Value {
        serde_json::Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_profile_is_inert() {
        let profile = NullAllocationProfile;
        assert!(profile.trace_ids(7).is_empty());
        assert!(profile.serialize_trace_tops().is_null());
    }
}
