//! Analysis engine for V8/Chromium heap snapshots.
//!
//! Parses a `.heapsnapshot` document into a flat-array [`heapgraph_model::GraphView`],
//! runs every structural analysis pass over it exactly once
//! ([`engine::Engine::initialize`]), and answers the queries a heap-profiler
//! UI issues afterward: aggregates by class, dominators, retainers,
//! cross-snapshot diffs, and named filters.
//!
//! # Example
//!
//! ```no_run
//! use heapgraph::engine::Engine;
//! use heapgraph::allocation::NullAllocationProfile;
//! use heapgraph_model::RawSnapshot;
//! use std::fs::File;
//!
//! let raw = RawSnapshot::parse(File::open("profile.heapsnapshot").unwrap()).unwrap();
//! let engine = Engine::initialize(&raw, Box::new(NullAllocationProfile), None).unwrap();
//! println!("total size: {}", engine.total_size());
//! ```

pub mod aggregate;
pub mod allocation;
pub mod classname;
pub mod diff;
pub mod distance;
pub mod dom_state;
pub mod dominated;
pub mod dominators;
pub mod engine;
pub mod error;
pub mod essential;
pub mod filters;
pub mod page_gate;
pub mod postorder;
pub mod provider;
pub mod retained_size;
pub mod retainers;
pub mod samples;
pub mod shallow_size;

pub use engine::Engine;
pub use error::{EngineError, QueryError, QueryResult, Result};
