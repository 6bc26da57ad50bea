//! Flat-array data model for V8/Chromium heap snapshots.
//!
//! This crate owns the boundary between a serialized `.heapsnapshot` file
//! and the typed, flat-array representation the analysis engine in
//! `heapgraph` operates on. It parses the documented meta-schema
//! (`snapshot.meta`), builds a [`GraphView`] over the raw `nodes`/`edges`
//! arrays, and exposes a paged integer array ([`PagedU32Array`]) as the
//! common backing storage for every array the engine derives.
//!
//! Snapshot *streaming* (incremental, chunked file parsing) is out of
//! scope here — [`RawSnapshot::parse`] reads a complete value with
//! `serde_json` and hands it to [`GraphView::build`].

pub mod meta;
pub mod paged;
pub mod raw;
pub mod view;

pub use meta::{EdgeTypeId, FieldMeta, NodeTypeId, SnapshotMeta};
pub use paged::PagedU32Array;
pub use raw::{ModelError, RawSnapshot, Result};
pub use view::{EdgeRef, GraphView, NodeRef};

/// Sentinel for "no distance computed".
pub const NO_DISTANCE: i32 = -5;

/// Offset added to user-root distances to park system-only objects at the
/// tail of any distance-sorted view.
pub const BASE_SYSTEM_DISTANCE: i32 = 100_000_000;

/// Distance used for retainer-view edges that are ignored, guaranteed to
/// sort strictly after [`BASE_SYSTEM_DISTANCE`].
pub const BASE_UNREACHABLE_DISTANCE: i32 = BASE_SYSTEM_DISTANCE + 1;

/// Marks a not-yet-assigned dominator/owner slot.
pub const NO_ENTRY: u32 = u32::MAX;

/// DOM link state packed into the low 2 bits of `detachedness_and_class_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DomLinkState {
    Unknown = 0,
    Attached = 1,
    Detached = 2,
}

impl DomLinkState {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            1 => DomLinkState::Attached,
            2 => DomLinkState::Detached,
            _ => DomLinkState::Unknown,
        }
    }

    pub fn to_bits(self) -> u32 {
        self as u32
    }
}

/// Per-node flag bits.
pub mod flags {
    pub const CAN_BE_QUERIED: u32 = 1;
    pub const DETACHED_DOM_TREE_NODE: u32 = 2;
    pub const PAGE_OBJECT: u32 = 4;
}
