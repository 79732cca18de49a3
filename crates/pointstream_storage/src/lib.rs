#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! Storage and scheduling for streamed point-cloud octrees.
//!
//! The dataset lives on disk or across a network and never fits in memory. This crate exposes the
//! currently relevant subset under a hard budget on resident points:
//!   - `HierarchyStore`: node metadata in a hashed octree, expanded lazily from hierarchy chunks
//!   - `LoadScheduler`: asynchronous fetch + decode of node payloads over a bounded decoder pool
//!   - `NodeCache`: LRU-ordered residency tracking with budgeted eviction and pinning
//!   - `Octree`: the runtime context tying the above together, pumped by an external driver
//!
//! Fetching and decoding run out-of-band; all node and cache state is mutated only on the thread
//! that calls `Octree::pump`, so no locks guard it.

pub mod attribute;
pub mod buffer;
pub mod cache;
pub mod format;
pub mod hierarchy;
pub mod meta;
pub mod node;
pub mod octree;
pub mod pool;
pub mod scheduler;

pub use attribute::*;
pub use buffer::*;
pub use cache::*;
pub use format::*;
pub use hierarchy::*;
pub use meta::*;
pub use node::*;
pub use octree::*;
pub use pool::*;
pub use scheduler::*;

// Hash types to use for small keys like `NodeId`.
pub type SmallKeyHashMap<K, V> = ahash::AHashMap<K, V>;
pub type SmallKeyHashSet<K> = ahash::AHashSet<K>;

pub mod prelude {
    pub use super::{
        AttributeKind, ChildMask, DatasetMeta, DecodeError, DecodeInput, DecodeOutput, ElementType,
        FetchError, Fetcher, HierarchyStore, LoadError, LoadScheduler, NodeCache, NodeId,
        NodeState, Octree, OctreeNode, PointAttribute, PointBuffer, PointDecoder, PointFormat,
        PointLayout, StandardBinaryDecoder, StreamConfig, Version,
    };
}
