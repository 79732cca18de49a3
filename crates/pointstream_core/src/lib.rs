//! The core geometry types for the pointstream octree engine:
//! - `Aabb3`: an axis-aligned f64 bounding box with octant subdivision
//! - `Sphere`: a bounding sphere
//! - `Plane`: an infinite plane with signed distance queries

pub mod aabb;
pub mod plane;

pub use aabb::{Aabb3, Sphere};
pub use plane::Plane;

pub use glam;

pub mod prelude {
    pub use super::{Aabb3, Plane, Sphere};
    pub use glam::DVec3;
}
