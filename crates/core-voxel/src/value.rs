/// Minimal arithmetic surface a voxel cell type must provide. Implemented
/// for `f32` (density/ratio grids) and `u32` (saturating hit counters);
/// float-only operations (interpolation, smoothing, true division) live in
/// an `impl Voxels<f32>` block instead of on this trait.
pub trait VoxelValue: Copy + Send + Sync + Default + PartialOrd + 'static {
    fn zero() -> Self;
    fn one() -> Self;
    fn saturating_add(self, rhs: Self) -> Self;
    fn to_f64(self) -> f64;
    fn from_f64(v: f64) -> Self;
}

impl VoxelValue for f32 {
    fn zero() -> Self {
        0.0
    }
    fn one() -> Self {
        1.0
    }
    fn saturating_add(self, rhs: Self) -> Self {
        self + rhs
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl VoxelValue for u32 {
    fn zero() -> Self {
        0
    }
    fn one() -> Self {
        1
    }
    fn saturating_add(self, rhs: Self) -> Self {
        u32::saturating_add(self, rhs)
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v.max(0.0) as u32
    }
}
