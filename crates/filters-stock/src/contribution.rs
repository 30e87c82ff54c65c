use core_geom::Point3D;

/// Cloud-in-cell trilinear deposition: distributes a unit contribution from
/// a point at `rel` (position relative to a grid origin) across the 8
/// neighboring cell centers, weighted by the sub-cuboid volumes the point's
/// offset from each corner forms. A point that lands exactly on a cell
/// center gets weight 1 on that single cell and 0 on the other seven.
///
/// Shared by the voxelization filter's sparse (isosurface) mode and the
/// proxigram's numerator/denominator accumulation — both specify the same
/// contribution-transfer kernel.
pub fn trilinear_deposit(rel: Point3D, voxel_size: Point3D) -> [((i32, i32, i32), f32); 8] {
    let u = Point3D::new(rel.x / voxel_size.x - 0.5, rel.y / voxel_size.y - 0.5, rel.z / voxel_size.z - 0.5);
    let base = (u.x.floor() as i32, u.y.floor() as i32, u.z.floor() as i32);
    let t = Point3D::new(u.x - base.0 as f32, u.y - base.1 as f32, u.z - base.2 as f32);

    let mut out = [((0, 0, 0), 0.0f32); 8];
    let mut n = 0;
    for dx in 0..2 {
        for dy in 0..2 {
            for dz in 0..2 {
                let wx = if dx == 0 { 1.0 - t.x } else { t.x };
                let wy = if dy == 0 { 1.0 - t.y } else { t.y };
                let wz = if dz == 0 { 1.0 - t.z } else { t.z };
                out[n] = ((base.0 + dx, base.1 + dy, base.2 + dz), wx * wy * wz);
                n += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one() {
        let weights = trilinear_deposit(Point3D::new(1.3, 1.7, 1.1), Point3D::new(1.0, 1.0, 1.0));
        let sum: f32 = weights.iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn exact_cell_center_puts_all_weight_on_one_cell() {
        let weights = trilinear_deposit(Point3D::new(0.5, 0.5, 0.5), Point3D::new(1.0, 1.0, 1.0));
        let hits: Vec<_> = weights.iter().filter(|(_, w)| *w > 1e-6).collect();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].1 - 1.0).abs() < 1e-5);
    }
}
