//! Dense and sparse voxel grids: the numeric backbone for voxelisation and
//! the proxigram's signed-distance field.

mod dense;
mod sparse;
mod value;

pub use dense::{InterpMode, Voxels};
pub use sparse::SparseVoxel;
pub use value::VoxelValue;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VoxelError {
    #[error("bounds are invalid or degenerate (coplanar/zero-volume)")]
    BoundsInvalid,
    #[error("requested allocation of {0} cells exceeds the memory budget")]
    OutOfMemory(usize),
    #[error("operation aborted")]
    Aborted,
}
