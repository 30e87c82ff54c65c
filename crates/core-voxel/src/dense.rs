use core_geom::{BoundCube, Point3D};
use rayon::prelude::*;

use crate::value::VoxelValue;
use crate::VoxelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpMode {
    None,
    Linear,
}

/// A dense `nx * ny * nz` array of `T`, laid out in row-major order
/// (`((x * ny) + y) * nz + z`), occupying a fixed physical bounding box.
///
/// Index/world conversion uses a half-open binning convention: a point
/// exactly on the upper face of the bounding box is clamped into the last
/// cell rather than falling one cell outside it (see `world_to_index`).
#[derive(Debug, Clone, PartialEq)]
pub struct Voxels<T> {
    nx: usize,
    ny: usize,
    nz: usize,
    data: Vec<T>,
    min_bound: Point3D,
    max_bound: Point3D,
}

/// Above this many cells, callers must opt in explicitly (cache-percent
/// budget enforcement lives one layer up, in the filters that allocate
/// these); this is just a sanity backstop against an obviously-invalid
/// triple product overflowing practical memory.
const MAX_CELLS_DEFAULT: usize = 1 << 30;

impl<T: VoxelValue> Voxels<T> {
    pub fn new(nx: usize, ny: usize, nz: usize, min_bound: Point3D, max_bound: Point3D) -> Result<Self, VoxelError> {
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(VoxelError::BoundsInvalid);
        }
        if min_bound.x >= max_bound.x || min_bound.y >= max_bound.y || min_bound.z >= max_bound.z {
            return Err(VoxelError::BoundsInvalid);
        }
        let n = nx.checked_mul(ny).and_then(|v| v.checked_mul(nz)).ok_or(VoxelError::OutOfMemory(usize::MAX))?;
        if n > MAX_CELLS_DEFAULT {
            return Err(VoxelError::OutOfMemory(n));
        }
        Ok(Self { nx, ny, nz, data: vec![T::zero(); n], min_bound, max_bound })
    }

    pub fn from_bound_cube(nx: usize, ny: usize, nz: usize, bc: &BoundCube) -> Result<Self, VoxelError> {
        let (min, max) = (bc.min().ok_or(VoxelError::BoundsInvalid)?, bc.max().ok_or(VoxelError::BoundsInvalid)?);
        Self::new(nx, ny, nz, min, max)
    }

    pub fn size(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bounds(&self) -> (Point3D, Point3D) {
        (self.min_bound, self.max_bound)
    }

    pub fn pitch(&self) -> Point3D {
        let ext = self.max_bound - self.min_bound;
        Point3D::new(ext.x / self.nx as f32, ext.y / self.ny as f32, ext.z / self.nz as f32)
    }

    pub fn bin_volume(&self) -> f64 {
        let p = self.pitch();
        p.x as f64 * p.y as f64 * p.z as f64
    }

    #[inline]
    fn flat_index(&self, x: usize, y: usize, z: usize) -> usize {
        (x * self.ny + y) * self.nz + z
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> T {
        self.data[self.flat_index(x, y, z)]
    }

    pub fn get_flat(&self, i: usize) -> T {
        self.data[i]
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize, v: T) {
        let i = self.flat_index(x, y, z);
        self.data[i] = v;
    }

    pub fn set_flat(&mut self, i: usize, v: T) {
        self.data[i] = v;
    }

    pub fn fill(&mut self, v: T) {
        self.data.iter_mut().for_each(|c| *c = v);
    }

    pub fn clear(&mut self) {
        self.fill(T::zero());
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// World position of the *centre* of cell `(x,y,z)`.
    pub fn index_to_world(&self, x: usize, y: usize, z: usize) -> Point3D {
        let p = self.pitch();
        self.min_bound + Point3D::new((x as f32 + 0.5) * p.x, (y as f32 + 0.5) * p.y, (z as f32 + 0.5) * p.z)
    }

    /// Half-open binning: `world_to_index` for a point exactly on the upper
    /// bounding face clamps into the last valid cell on that axis rather
    /// than landing one cell past the end. Returns `None` if `p` lies
    /// (non-trivially) outside the bounding box.
    pub fn world_to_index(&self, p: Point3D) -> Option<(usize, usize, usize)> {
        let eps = f32::EPSILON.sqrt();
        if p.x < self.min_bound.x - eps
            || p.y < self.min_bound.y - eps
            || p.z < self.min_bound.z - eps
            || p.x > self.max_bound.x + eps
            || p.y > self.max_bound.y + eps
            || p.z > self.max_bound.z + eps
        {
            return None;
        }
        let frac = (p - self.min_bound) / (self.max_bound - self.min_bound);
        let raw = [
            (frac.x * self.nx as f32) as i64,
            (frac.y * self.ny as f32) as i64,
            (frac.z * self.nz as f32) as i64,
        ];
        let n = [self.nx as i64, self.ny as i64, self.nz as i64];
        let mut out = [0usize; 3];
        for i in 0..3 {
            let mut idx = raw[i].clamp(0, n[i]);
            if idx == n[i] {
                idx -= 1; // upper-edge clamp
            }
            out[i] = idx as usize;
        }
        Some((out[0], out[1], out[2]))
    }

    pub fn fill_sum(&self) -> f64 {
        self.data.iter().map(|v| v.to_f64()).sum()
    }

    pub fn min_max(&self) -> (T, T) {
        let mut min = self.data[0];
        let mut max = self.data[0];
        for &v in &self.data[1..] {
            if v < min {
                min = v;
            }
            if max < v {
                max = v;
            }
        }
        (min, max)
    }

    pub fn count_above(&self, threshold: T) -> usize {
        self.data.iter().filter(|&&v| threshold < v || threshold == v).count()
    }

    /// Bin point hits into cells, incrementing by one per hit. When
    /// `saturate` is true (the default in the original tool), a cell whose
    /// counter would wrap is left at its previous (maximal) value instead of
    /// wrapping around to a small number.
    pub fn count_point_hits(&mut self, points: &[Point3D], saturate: bool, mut should_abort: impl FnMut() -> bool) -> Result<usize, VoxelError> {
        let mut dropped_outside = 0usize;
        for (i, p) in points.iter().enumerate() {
            if i % 4096 == 0 && should_abort() {
                return Err(VoxelError::Aborted);
            }
            match self.world_to_index(*p) {
                Some((x, y, z)) => {
                    let idx = self.flat_index(x, y, z);
                    let cur = self.data[idx];
                    let next = cur.saturating_add(T::one());
                    if saturate && next < cur {
                        // wrapped: leave as-is
                    } else {
                        self.data[idx] = next;
                    }
                }
                None => dropped_outside += 1,
            }
        }
        Ok(dropped_outside)
    }

    /// Raw, un-interpolated slice at an integer cell offset along `axis`
    /// (0=x, 1=y, 2=z). Output is `dimA * dimB` laid out as `p[posB*dimA +
    /// posA]`, where `dimA`/`dimB` are the two axes orthogonal to `axis` in
    /// ascending order.
    pub fn get_slice(&self, axis: usize, offset: usize) -> Vec<T> {
        assert!(axis < 3);
        let (dim_a, dim_b, n_a, n_b) = self.ortho_dims(axis);
        let mut out = vec![T::zero(); n_a * n_b];
        for b in 0..n_b {
            for a in 0..n_a {
                let mut coords = [0usize; 3];
                coords[axis] = offset;
                coords[dim_a] = a;
                coords[dim_b] = b;
                out[b * n_a + a] = self.get(coords[0], coords[1], coords[2]);
            }
        }
        out
    }

    fn ortho_dims(&self, axis: usize) -> (usize, usize, usize, usize) {
        let sizes = [self.nx, self.ny, self.nz];
        let (dim_a, dim_b) = match axis {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };
        (dim_a, dim_b, sizes[dim_a], sizes[dim_b])
    }
}

// Float-only operations: interpolation, smoothing, true division, density.
impl Voxels<f32> {
    pub fn get_interpolated(&self, p: Point3D) -> Option<f32> {
        let (ix, iy, iz) = self.world_to_index(p)?;
        let pitch = self.pitch();
        let cell_min = self.min_bound + Point3D::new(ix as f32, iy as f32, iz as f32) * pitch;
        let mut frac = (p - cell_min) / pitch;
        frac.x = frac.x.clamp(0.0, 1.0);
        frac.y = frac.y.clamp(0.0, 1.0);
        frac.z = frac.z.clamp(0.0, 1.0);

        let ip1 = |i: usize, n: usize| if i + 1 < n { i + 1 } else { i };
        let jx = ip1(ix, self.nx);
        let jy = ip1(iy, self.ny);
        let jz = ip1(iz, self.nz);

        let c000 = self.get(ix, iy, iz);
        let c100 = self.get(jx, iy, iz);
        let c010 = self.get(ix, jy, iz);
        let c110 = self.get(jx, jy, iz);
        let c001 = self.get(ix, iy, jz);
        let c101 = self.get(jx, iy, jz);
        let c011 = self.get(ix, jy, jz);
        let c111 = self.get(jx, jy, jz);

        let lerp = |a: f32, b: f32, t: f32| a * (1.0 - t) + b * t;
        let c00 = lerp(c000, c100, frac.x);
        let c10 = lerp(c010, c110, frac.x);
        let c01 = lerp(c001, c101, frac.x);
        let c11 = lerp(c011, c111, frac.x);
        let c0 = lerp(c00, c10, frac.y);
        let c1 = lerp(c01, c11, frac.y);
        Some(lerp(c0, c1, frac.z))
    }

    /// Fractional-offset slice (`offset` in `[0,1]` spans the full axis
    /// extent), optionally linearly interpolated between the two bracketing
    /// integer planes. `offset=0.0` and `offset=1.0` return exactly the
    /// first and last plane.
    pub fn get_interp_slice(&self, axis: usize, offset: f32, mode: InterpMode) -> Vec<f32> {
        assert!(axis < 3);
        let n = [self.nx, self.ny, self.nz][axis];
        let offset = offset.clamp(0.0, 1.0);
        let pos = offset * (n - 1) as f32;
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(n - 1);
        let t = pos - lo as f32;

        let slice_lo = self.get_slice(axis, lo);
        if mode == InterpMode::None || hi == lo || t == 0.0 {
            return slice_lo;
        }
        let slice_hi = self.get_slice(axis, hi);
        slice_lo.iter().zip(slice_hi.iter()).map(|(&a, &b)| a * (1.0 - t) + b * t).collect()
    }

    /// Element-wise `self /= other`, with `0/0 -> 0` and any non-finite
    /// result coerced to `0` (never NaN/Inf).
    pub fn divide_elementwise(&mut self, other: &Voxels<f32>) {
        assert_eq!(self.data.len(), other.data.len());
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            *a = if b == 0.0 { 0.0 } else { *a / b };
            if !a.is_finite() {
                *a = 0.0;
            }
        }
    }

    pub fn divide_scalar(&mut self, v: f32) {
        for a in self.data.iter_mut() {
            *a = if v == 0.0 { 0.0 } else { *a / v };
            if !a.is_finite() {
                *a = 0.0;
            }
        }
    }

    /// Rescale all values linearly so the data spans `[0,1]`. A constant
    /// field (min==max) is left at all-zero.
    pub fn rescale_to_unit(&mut self) {
        let (min, max) = self.min_max();
        let span = max - min;
        if span <= 0.0 {
            self.fill(0.0);
            return;
        }
        for a in self.data.iter_mut() {
            *a = (*a - min) / span;
        }
    }

    /// Convert accumulated counts/mass into a density by dividing each cell
    /// by the physical cell volume.
    pub fn calculate_density(&mut self) {
        let vol = self.bin_volume() as f32;
        self.divide_scalar(vol);
    }

    /// In-place separable isotropic Gaussian smoothing. `window_ratio`
    /// expresses the kernel half-width as a multiple of `stdev` (a
    /// `window_ratio` of 3 gives a 1D kernel spanning `+/- 3*stdev`).
    pub fn isotropic_gaussian_smooth(&mut self, stdev: f32, window_ratio: f32) {
        if stdev <= 0.0 {
            return;
        }
        let kernel = gaussian_kernel(stdev, window_ratio);
        self.convolve_separable(&kernel);
    }

    /// In-place Laplacian-of-Gaussian: a Gaussian smooth followed by a
    /// discrete 6-neighbour Laplacian, matching the combined blur+edge
    /// response the original tool used for ridge/shell enhancement.
    pub fn laplace_of_gaussian(&mut self, stdev: f32, window_ratio: f32) {
        self.isotropic_gaussian_smooth(stdev, window_ratio);
        let src = self.clone();
        for x in 0..self.nx {
            for y in 0..self.ny {
                for z in 0..self.nz {
                    let centre = src.get(x, y, z);
                    let mut acc = -6.0 * centre;
                    let neighbours = [
                        (x.wrapping_sub(1), y, z, x > 0),
                        (x + 1, y, z, x + 1 < self.nx),
                        (x, y.wrapping_sub(1), z, y > 0),
                        (x, y + 1, z, y + 1 < self.ny),
                        (x, y, z.wrapping_sub(1), z > 0),
                        (x, y, z + 1, z + 1 < self.nz),
                    ];
                    for (nx, ny, nz, valid) in neighbours {
                        acc += if valid { src.get(nx, ny, nz) } else { centre };
                    }
                    self.set(x, y, z, acc);
                }
            }
        }
    }

    fn convolve_separable(&mut self, kernel: &[f32]) {
        let radius = (kernel.len() / 2) as i64;
        self.convolve_axis(0, kernel, radius);
        self.convolve_axis(1, kernel, radius);
        self.convolve_axis(2, kernel, radius);
    }

    fn convolve_axis(&mut self, axis: usize, kernel: &[f32], radius: i64) {
        let sizes = [self.nx, self.ny, self.nz];
        let n = sizes[axis];
        let (dim_a, dim_b, n_a, n_b) = self.ortho_dims(axis);
        let src = self.data.clone();
        let get = |data: &[T2], x: usize, y: usize, z: usize| -> f32 {
            data[(x * self.ny + y) * self.nz + z]
        };
        type T2 = f32;
        let lines: Vec<(usize, usize)> = (0..n_b).flat_map(|b| (0..n_a).map(move |a| (a, b))).collect();
        let results: Vec<(usize, usize, Vec<f32>)> = lines
            .par_iter()
            .map(|&(a, b)| {
                let mut coords = [0usize; 3];
                coords[dim_a] = a;
                coords[dim_b] = b;
                let mut out_line = vec![0f32; n];
                for i in 0..n {
                    let mut acc = 0f32;
                    for (k, &w) in kernel.iter().enumerate() {
                        let offset = k as i64 - radius;
                        let src_i = (i as i64 + offset).clamp(0, n as i64 - 1) as usize;
                        coords[axis] = src_i;
                        acc += w * get(&src, coords[0], coords[1], coords[2]);
                    }
                    out_line[i] = acc;
                }
                (a, b, out_line)
            })
            .collect();
        for (a, b, line) in results {
            let mut coords = [0usize; 3];
            coords[dim_a] = a;
            coords[dim_b] = b;
            for (i, v) in line.into_iter().enumerate() {
                coords[axis] = i;
                self.set(coords[0], coords[1], coords[2], v);
            }
        }
    }
}

fn gaussian_kernel(stdev: f32, window_ratio: f32) -> Vec<f32> {
    let radius = ((stdev * window_ratio).ceil() as i64).max(1);
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| {
            let x = i as f32;
            (-0.5 * (x / stdev).powi(2)).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    if sum > 0.0 {
        kernel.iter_mut().for_each(|v| *v /= sum);
    }
    kernel
}
