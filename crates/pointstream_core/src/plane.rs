use glam::DVec3;

/// An infinite plane in Hessian normal form: all points `p` with `normal.dot(p) + d == 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: DVec3,
    pub d: f64,
}

impl Plane {
    /// The plane with unit normal `normal` passing through `point`.
    #[inline]
    pub fn from_normal_and_point(normal: DVec3, point: DVec3) -> Self {
        let normal = normal.normalize();

        Self {
            normal,
            d: -normal.dot(point),
        }
    }

    /// Positive on the side the normal points into, negative on the other.
    #[inline]
    pub fn signed_distance(&self, p: DVec3) -> f64 {
        self.normal.dot(p) + self.d
    }

    #[inline]
    pub fn distance(&self, p: DVec3) -> f64 {
        self.signed_distance(p).abs()
    }
}
