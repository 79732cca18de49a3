//! Algorithms that walk a streaming octree: budgeted best-first traversal, visibility
//! collection, and cross-section profile extraction.
//!
//! Everything here drives an [`Octree`](pointstream_storage::Octree) cooperatively. A traversal
//! never blocks on IO; when it reaches a node that is not resident it requests the load and
//! revisits the node on a later tick, after `Octree::pump` has drained the result.

pub mod profile;
pub mod traversal;
pub mod visibility;

pub use profile::*;
pub use traversal::*;
pub use visibility::*;
