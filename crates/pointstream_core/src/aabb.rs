use glam::DVec3;

/// An axis-aligned bounding box in f64 world coordinates.
///
/// The empty box is represented by `min > max` so that expanding an empty box by a point yields
/// the degenerate box containing exactly that point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb3 {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb3 {
    pub const EMPTY: Self = Self {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };

    #[inline]
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    #[inline]
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    #[inline]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Grow the box just enough to contain `p`.
    #[inline]
    pub fn expand_by_point(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// The smallest box containing both `self` and `other`.
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }

        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[inline]
    pub fn contains_point(&self, p: DVec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// The box of the child octant selected by `octant`, where bit 2 selects the upper half in X,
    /// bit 1 in Y, and bit 0 in Z.
    pub fn child_octant(&self, octant: u8) -> Self {
        debug_assert!(octant < 8);

        let half = self.size() * 0.5;
        let offset = DVec3::new(
            if octant & 0b100 != 0 { half.x } else { 0.0 },
            if octant & 0b010 != 0 { half.y } else { 0.0 },
            if octant & 0b001 != 0 { half.z } else { 0.0 },
        );
        let min = self.min + offset;

        Self {
            min,
            max: min + half,
        }
    }

    /// The sphere through the box corners, centered on the box center.
    #[inline]
    pub fn bounding_sphere(&self) -> Sphere {
        let center = self.center();

        Sphere {
            center,
            radius: (self.max - center).length(),
        }
    }
}

/// A bounding sphere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub center: DVec3,
    pub radius: f64,
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn child_octants_tile_the_parent() {
        let parent = Aabb3::new(DVec3::new(-2.0, 0.0, 4.0), DVec3::new(6.0, 8.0, 12.0));

        let mut union = Aabb3::EMPTY;
        for octant in 0..8 {
            let child = parent.child_octant(octant);
            assert_eq!(child.size(), parent.size() * 0.5);
            union = union.union(&child);
        }

        assert_eq!(union, parent);
    }

    #[test]
    fn expand_empty_box_by_point_gives_degenerate_box() {
        let mut b = Aabb3::EMPTY;
        assert!(b.is_empty());

        let p = DVec3::new(1.0, 2.0, 3.0);
        b.expand_by_point(p);

        assert_eq!(b.min, p);
        assert_eq!(b.max, p);
        assert!(!b.is_empty());
    }

    #[test]
    fn bounding_sphere_reaches_the_corners() {
        let b = Aabb3::new(DVec3::ZERO, DVec3::splat(2.0));
        let s = b.bounding_sphere();

        assert_eq!(s.center, DVec3::splat(1.0));
        assert!((s.radius - 3.0f64.sqrt()).abs() < 1e-12);
    }
}
