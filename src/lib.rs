//! A streaming engine for point clouds too large to hold in memory, organized as multi-level
//! octrees whose node payloads are fetched and decoded on demand.
//!
//! This library is organized into several crates. The most fundamental are:
//! - **core**: geometric primitives shared by everything else
//! - **storage**: the hierarchy store, load scheduler, node cache, and the `Octree` runtime
//!   context tying them together
//!
//! Then you get extra bits of functionality from the others:
//! - **search**: budgeted best-first traversal, visibility collection, and cross-section
//!   profile queries
//!
//! Everything is driven cooperatively: callers tick `Octree::pump` and the query types' `step`
//! methods from one thread, while fetching and decoding run on worker threads behind a channel.

pub use pointstream_core as core;
pub use pointstream_storage as storage;

pub mod prelude {
    pub use super::core::prelude::*;
    pub use super::storage::prelude::*;
}

#[cfg(feature = "search")]
pub use pointstream_search as search;
