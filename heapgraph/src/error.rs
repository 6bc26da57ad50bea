//! Error taxonomy for the analysis engine.
//!
//! Data-invariant violations are fatal and stop `initialize()`; caller
//! errors are returned from query entry points without touching state.
//! Structural warnings (unreachable nodes, weak-only retainers) are not
//! errors at all — they're collected into [`crate::postorder::StructuralWarnings`]
//! and logged through `tracing`.

use thiserror::Error;

/// Fatal data-invariant violations raised while building the engine's
/// derived arrays. None of these are recoverable; the caller gets back a
/// snapshot that could not be analyzed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("edge {edge_index} has to_node_index {to_node_index} which is not a multiple of the node field count")]
    InvalidToNodeIndex { edge_index: u64, to_node_index: u32 },

    #[error("class index {0} overflows the 30 bits reserved for it")]
    ClassIndexOverflow(u32),

    #[error("node count {0} is too large for shallow-size reassignment (must be < 0xFFFF_FFFE)")]
    NodeCountTooLarge(u64),

    #[error("root ordinal did not reach post-order index node_count-1 (got {got}, expected {expected})")]
    RootNotLastInPostorder { got: u64, expected: u64 },

    #[error("analysis cancelled during phase '{phase}'")]
    Cancelled { phase: String },

    #[error(transparent)]
    Model(#[from] heapgraph_model::ModelError),
}

/// Errors returned from query entry points; these never mutate engine state.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown named filter '{0}'")]
    UnknownFilter(String),

    #[error("window [{begin}, {end}) is out of range for a collection of length {len}")]
    WindowOutOfRange { begin: usize, end: usize, len: usize },

    #[error("no snapshot registered under diff base id '{0}'")]
    UnknownDiffBase(String),

    #[error("unknown sort field '{0}'")]
    UnknownSortField(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
pub type QueryResult<T> = std::result::Result<T, QueryError>;
