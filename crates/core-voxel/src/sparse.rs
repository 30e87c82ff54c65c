use std::collections::HashMap;
use std::collections::hash_map::{Iter, IterMut};

use core_geom::Point3D;

/// An implicit/sparse voxel field: only the voxels actually touched are
/// stored, keyed by integer cell coordinate. Used for the proxigram's
/// narrow-band signed-distance field, where the active set is a thin shell
/// around the iso-surface rather than the whole bounding volume.
#[derive(Debug, Clone)]
pub struct SparseVoxel<T> {
    origin: Point3D,
    voxel_size: Point3D,
    active: HashMap<(i32, i32, i32), T>,
}

impl<T: Copy> SparseVoxel<T> {
    pub fn new(origin: Point3D, voxel_size: Point3D) -> Self {
        Self { origin, voxel_size, active: HashMap::new() }
    }

    pub fn origin(&self) -> Point3D {
        self.origin
    }

    pub fn voxel_size(&self) -> Point3D {
        self.voxel_size
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Maps a world position to the integer cell coordinate that contains
    /// it (floor division per axis, so negative coordinates bin correctly).
    pub fn index_of(&self, p: Point3D) -> (i32, i32, i32) {
        let rel = p - self.origin;
        (
            (rel.x / self.voxel_size.x).floor() as i32,
            (rel.y / self.voxel_size.y).floor() as i32,
            (rel.z / self.voxel_size.z).floor() as i32,
        )
    }

    pub fn cell_centre(&self, idx: (i32, i32, i32)) -> Point3D {
        self.origin
            + Point3D::new(
                (idx.0 as f32 + 0.5) * self.voxel_size.x,
                (idx.1 as f32 + 0.5) * self.voxel_size.y,
                (idx.2 as f32 + 0.5) * self.voxel_size.z,
            )
    }

    pub fn get(&self, idx: (i32, i32, i32)) -> Option<T> {
        self.active.get(&idx).copied()
    }

    pub fn get_at_point(&self, p: Point3D) -> Option<T> {
        self.get(self.index_of(p))
    }

    pub fn set(&mut self, idx: (i32, i32, i32), v: T) {
        self.active.insert(idx, v);
    }

    pub fn set_at_point(&mut self, p: Point3D, v: T) {
        let idx = self.index_of(p);
        self.set(idx, v);
    }

    pub fn remove(&mut self, idx: (i32, i32, i32)) -> Option<T> {
        self.active.remove(&idx)
    }

    pub fn contains(&self, idx: (i32, i32, i32)) -> bool {
        self.active.contains_key(&idx)
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn iter(&self) -> Iter<'_, (i32, i32, i32), T> {
        self.active.iter()
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, (i32, i32, i32), T> {
        self.active.iter_mut()
    }

    /// The 6-connected face neighbours of `idx`, regardless of whether they
    /// are themselves active.
    pub fn face_neighbours(idx: (i32, i32, i32)) -> [(i32, i32, i32); 6] {
        [
            (idx.0 - 1, idx.1, idx.2),
            (idx.0 + 1, idx.1, idx.2),
            (idx.0, idx.1 - 1, idx.2),
            (idx.0, idx.1 + 1, idx.2),
            (idx.0, idx.1, idx.2 - 1),
            (idx.0, idx.1, idx.2 + 1),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_of_handles_negative_coordinates() {
        let sv = SparseVoxel::<f32>::new(Point3D::ZERO, Point3D::new(1.0, 1.0, 1.0));
        assert_eq!(sv.index_of(Point3D::new(-0.5, -0.5, -0.5)), (-1, -1, -1));
        assert_eq!(sv.index_of(Point3D::new(0.5, 0.5, 0.5)), (0, 0, 0));
    }

    #[test]
    fn set_get_round_trip_and_len() {
        let mut sv = SparseVoxel::<f32>::new(Point3D::ZERO, Point3D::new(0.5, 0.5, 0.5));
        sv.set_at_point(Point3D::new(1.2, 1.2, 1.2), 3.5);
        assert_eq!(sv.len(), 1);
        assert_eq!(sv.get_at_point(Point3D::new(1.2, 1.2, 1.2)), Some(3.5));
        assert_eq!(sv.get((0, 0, 0)), None);
    }

    #[test]
    fn face_neighbours_are_6_connected() {
        let n = SparseVoxel::<f32>::face_neighbours((0, 0, 0));
        assert_eq!(n.len(), 6);
        assert!(n.contains(&(1, 0, 0)));
        assert!(n.contains(&(-1, 0, 0)));
    }
}
