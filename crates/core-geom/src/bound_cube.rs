use crate::Point3D;

/// Axis-aligned box. An "invalid" cube (the default) has no volume and no
/// corners; it is the identity element for `union`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundCube {
    bounds: Option<(Point3D, Point3D)>,
}

impl Default for BoundCube {
    fn default() -> Self {
        Self::invalid()
    }
}

impl BoundCube {
    pub fn invalid() -> Self {
        Self { bounds: None }
    }

    pub fn new(min: Point3D, max: Point3D) -> Self {
        Self { bounds: Some((min, max)) }
    }

    pub fn is_valid(&self) -> bool {
        self.bounds.is_some()
    }

    pub fn is_empty(&self) -> bool {
        match self.bounds {
            None => true,
            Some((min, max)) => min.x >= max.x || min.y >= max.y || min.z >= max.z,
        }
    }

    pub fn min(&self) -> Option<Point3D> {
        self.bounds.map(|(min, _)| min)
    }

    pub fn max(&self) -> Option<Point3D> {
        self.bounds.map(|(_, max)| max)
    }

    /// Expand this cube to also cover `other`. Expanding an invalid cube by a
    /// valid one yields the valid one; expanding by another invalid cube is a
    /// no-op.
    pub fn union(&mut self, other: &BoundCube) {
        let Some((omin, omax)) = other.bounds else { return };
        self.bounds = Some(match self.bounds {
            None => (omin, omax),
            Some((min, max)) => (
                Point3D::new(min.x.min(omin.x), min.y.min(omin.y), min.z.min(omin.z)),
                Point3D::new(max.x.max(omax.x), max.y.max(omax.y), max.z.max(omax.z)),
            ),
        });
    }

    pub fn expand_by_point(&mut self, p: &Point3D) {
        self.bounds = Some(match self.bounds {
            None => (*p, *p),
            Some((min, max)) => (
                Point3D::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z)),
                Point3D::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z)),
            ),
        });
    }

    pub fn from_points(points: impl IntoIterator<Item = Point3D>) -> BoundCube {
        let mut bc = BoundCube::invalid();
        for p in points {
            bc.expand_by_point(&p);
        }
        bc
    }

    pub fn contains_pt(&self, p: &Point3D) -> bool {
        match self.bounds {
            None => false,
            Some((min, max)) => {
                p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y && p.z >= min.z && p.z <= max.z
            }
        }
    }

    pub fn centroid(&self) -> Option<Point3D> {
        self.bounds.map(|(min, max)| (min + max) * 0.5)
    }

    /// The largest of the three axis extents, or 0.0 when invalid.
    pub fn largest_extent(&self) -> f32 {
        match self.bounds {
            None => 0.0,
            Some((min, max)) => (max.x - min.x).max(max.y - min.y).max(max.z - min.z),
        }
    }

    pub fn extent(&self) -> Point3D {
        match self.bounds {
            None => Point3D::ZERO,
            Some((min, max)) => max - min,
        }
    }

    /// Intersect this cube with the plane through `origin` with unit normal
    /// `normal`, returning `None` if the plane misses the cube (or the cube
    /// is invalid) and otherwise the axis-aligned 2D rectangle of the
    /// intersection expressed as (min, max) corners still in 3D, flattened
    /// onto the plane's dominant axis.
    pub fn intersect_plane(&self, origin: Point3D, normal: Point3D) -> Option<(Point3D, Point3D)> {
        let (min, max) = self.bounds?;
        let n = normal.normalized()?;
        // Evaluate the signed distance of each of the 8 corners; a crossing
        // exists iff corners lie on both sides (or exactly on the plane).
        let corners = [
            Point3D::new(min.x, min.y, min.z),
            Point3D::new(max.x, min.y, min.z),
            Point3D::new(min.x, max.y, min.z),
            Point3D::new(max.x, max.y, min.z),
            Point3D::new(min.x, min.y, max.z),
            Point3D::new(max.x, min.y, max.z),
            Point3D::new(min.x, max.y, max.z),
            Point3D::new(max.x, max.y, max.z),
        ];
        let mut has_pos = false;
        let mut has_neg = false;
        for c in corners {
            let d = (c - origin).dot(&n);
            if d > 1e-9 {
                has_pos = true;
            } else if d < -1e-9 {
                has_neg = true;
            } else {
                has_pos = true;
                has_neg = true;
            }
        }
        if !(has_pos && has_neg) {
            return None;
        }
        Some((min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_is_empty_and_contains_nothing() {
        let bc = BoundCube::invalid();
        assert!(!bc.is_valid());
        assert!(bc.is_empty());
        assert!(!bc.contains_pt(&Point3D::ZERO));
    }

    #[test]
    fn union_of_invalid_and_valid_is_valid() {
        let mut bc = BoundCube::invalid();
        bc.union(&BoundCube::new(Point3D::ZERO, Point3D::new(1.0, 1.0, 1.0)));
        assert!(bc.is_valid());
        assert_eq!(bc.min().unwrap(), Point3D::ZERO);
    }

    #[test]
    fn union_expands_to_cover_both() {
        let mut a = BoundCube::new(Point3D::new(0.0, 0.0, 0.0), Point3D::new(1.0, 1.0, 1.0));
        let b = BoundCube::new(Point3D::new(-1.0, 2.0, 0.5), Point3D::new(0.5, 3.0, 4.0));
        a.union(&b);
        assert_eq!(a.min().unwrap(), Point3D::new(-1.0, 0.0, 0.0));
        assert_eq!(a.max().unwrap(), Point3D::new(1.0, 3.0, 4.0));
    }

    #[test]
    fn centroid_and_largest_extent() {
        let bc = BoundCube::new(Point3D::ZERO, Point3D::new(2.0, 4.0, 1.0));
        assert_eq!(bc.centroid().unwrap(), Point3D::new(1.0, 2.0, 0.5));
        assert_eq!(bc.largest_extent(), 4.0);
    }

    #[test]
    fn plane_through_middle_intersects() {
        let bc = BoundCube::new(Point3D::ZERO, Point3D::new(1.0, 1.0, 1.0));
        assert!(bc.intersect_plane(Point3D::new(0.5, 0.5, 0.5), Point3D::new(0.0, 0.0, 1.0)).is_some());
    }

    #[test]
    fn plane_outside_cube_misses() {
        let bc = BoundCube::new(Point3D::ZERO, Point3D::new(1.0, 1.0, 1.0));
        assert!(bc.intersect_plane(Point3D::new(0.0, 0.0, 10.0), Point3D::new(0.0, 0.0, 1.0)).is_none());
    }
}
