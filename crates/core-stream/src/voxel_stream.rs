use core_voxel::{SparseVoxel, Voxels};

#[derive(Debug, Clone, PartialEq)]
pub struct VoxelDenseStream {
    pub grid: Voxels<f32>,
    pub colour_map: String,
    pub iso_level: f32,
    pub opacity: f32,
}

impl VoxelDenseStream {
    pub fn new(grid: Voxels<f32>) -> Self {
        Self { grid, colour_map: "default".to_string(), iso_level: 0.5, opacity: 1.0 }
    }
}

#[derive(Debug, Clone)]
pub struct VoxelSparseStream {
    pub field: SparseVoxel<f32>,
    pub iso_level: f32,
    pub opacity: f32,
}

impl PartialEq for VoxelSparseStream {
    fn eq(&self, other: &Self) -> bool {
        self.iso_level == other.iso_level && self.opacity == other.opacity && self.field.len() == other.field.len()
    }
}

impl VoxelSparseStream {
    pub fn new(field: SparseVoxel<f32>) -> Self {
        Self { field, iso_level: 0.0, opacity: 1.0 }
    }
}
