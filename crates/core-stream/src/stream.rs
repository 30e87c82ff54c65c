use bitflags::bitflags;

use crate::{Cached, DrawList, FilterId, IonsStream, Plot1D, Plot2D, RangeStream, VoxelDenseStream, VoxelSparseStream};

bitflags! {
    /// Bitmask over the seven `FilterStream` kinds. Filters declare three of
    /// these (`use_mask`, `block_mask`, `emit_mask`) to describe, without
    /// running, which stream kinds they touch.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StreamKindMask: u8 {
        const IONS         = 0b0000_0001;
        const PLOT1D        = 0b0000_0010;
        const PLOT2D        = 0b0000_0100;
        const DRAW          = 0b0000_1000;
        const RANGE         = 0b0001_0000;
        const VOXEL_DENSE   = 0b0010_0000;
        const VOXEL_SPARSE  = 0b0100_0000;
    }
}

/// A single typed data packet flowing between filters. Every variant
/// carries the identity of its producer and an ownership tri-state; see
/// [`Cached`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterStream {
    Ions { parent: FilterId, cached: Cached, data: IonsStream },
    Plot1D { parent: FilterId, cached: Cached, data: Plot1D },
    Plot2D { parent: FilterId, cached: Cached, data: Plot2D },
    Draw { parent: FilterId, cached: Cached, data: DrawList },
    Range { parent: FilterId, cached: Cached, data: RangeStream },
    VoxelDense { parent: FilterId, cached: Cached, data: VoxelDenseStream },
    VoxelSparse { parent: FilterId, cached: Cached, data: VoxelSparseStream },
}

impl FilterStream {
    pub fn kind(&self) -> StreamKindMask {
        match self {
            FilterStream::Ions { .. } => StreamKindMask::IONS,
            FilterStream::Plot1D { .. } => StreamKindMask::PLOT1D,
            FilterStream::Plot2D { .. } => StreamKindMask::PLOT2D,
            FilterStream::Draw { .. } => StreamKindMask::DRAW,
            FilterStream::Range { .. } => StreamKindMask::RANGE,
            FilterStream::VoxelDense { .. } => StreamKindMask::VOXEL_DENSE,
            FilterStream::VoxelSparse { .. } => StreamKindMask::VOXEL_SPARSE,
        }
    }

    pub fn parent(&self) -> FilterId {
        match self {
            FilterStream::Ions { parent, .. }
            | FilterStream::Plot1D { parent, .. }
            | FilterStream::Plot2D { parent, .. }
            | FilterStream::Draw { parent, .. }
            | FilterStream::Range { parent, .. }
            | FilterStream::VoxelDense { parent, .. }
            | FilterStream::VoxelSparse { parent, .. } => *parent,
        }
    }

    pub fn cached(&self) -> Cached {
        match self {
            FilterStream::Ions { cached, .. }
            | FilterStream::Plot1D { cached, .. }
            | FilterStream::Plot2D { cached, .. }
            | FilterStream::Draw { cached, .. }
            | FilterStream::Range { cached, .. }
            | FilterStream::VoxelDense { cached, .. }
            | FilterStream::VoxelSparse { cached, .. } => *cached,
        }
    }

    pub fn with_cached(self, cached: Cached) -> Self {
        match self {
            FilterStream::Ions { parent, data, .. } => FilterStream::Ions { parent, cached, data },
            FilterStream::Plot1D { parent, data, .. } => FilterStream::Plot1D { parent, cached, data },
            FilterStream::Plot2D { parent, data, .. } => FilterStream::Plot2D { parent, cached, data },
            FilterStream::Draw { parent, data, .. } => FilterStream::Draw { parent, cached, data },
            FilterStream::Range { parent, data, .. } => FilterStream::Range { parent, cached, data },
            FilterStream::VoxelDense { parent, data, .. } => FilterStream::VoxelDense { parent, cached, data },
            FilterStream::VoxelSparse { parent, data, .. } => FilterStream::VoxelSparse { parent, cached, data },
        }
    }

    pub fn as_ions(&self) -> Option<&IonsStream> {
        match self {
            FilterStream::Ions { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn as_range(&self) -> Option<&RangeStream> {
        match self {
            FilterStream::Range { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn as_voxel_sparse(&self) -> Option<&VoxelSparseStream> {
        match self {
            FilterStream::VoxelSparse { data, .. } => Some(data),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_mask_round_trips_each_variant() {
        let parent = FilterId::fresh();
        let s = FilterStream::Ions { parent, cached: Cached::Transferred, data: IonsStream::new(vec![]) };
        assert_eq!(s.kind(), StreamKindMask::IONS);
        assert_eq!(s.parent(), parent);
        assert_eq!(s.cached(), Cached::Transferred);
    }

    #[test]
    fn with_cached_flips_ownership_without_touching_payload() {
        let s = FilterStream::Ions { parent: FilterId::fresh(), cached: Cached::Transferred, data: IonsStream::new(vec![]) };
        let s = s.with_cached(Cached::Owned);
        assert_eq!(s.cached(), Cached::Owned);
    }

    #[test]
    fn mask_composes_with_bitor() {
        let m = StreamKindMask::IONS | StreamKindMask::RANGE;
        assert!(m.contains(StreamKindMask::IONS));
        assert!(!m.contains(StreamKindMask::PLOT1D));
    }
}
