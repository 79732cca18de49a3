//! Common code for tests: synthetic in-memory point cloud datasets and a scripted fetcher.

mod cloud;
mod fetch;

pub use cloud::*;
pub use fetch::*;
