//! The typed data packets that flow between filters, and the ownership
//! rules attached to them.

mod cached;
mod draw;
mod filter_id;
mod ion;
mod ions_stream;
mod plot;
mod range_stream;
mod stream;
mod voxel_stream;

pub use cached::Cached;
pub use draw::{ColourBar, DrawList, DrawPrimitive, SliceImage};
pub use filter_id::FilterId;
pub use ion::{decode_ion_buffer, encode_ion_buffer, IonDecodeError, IonHit, ION_HIT_BYTES};
pub use ions_stream::{IonValueType, IonsStream};
pub use plot::{ErrorBars, Plot1D, Plot2D, Plot2DData, PlotRegion, PlotStyle};
pub use range_stream::RangeStream;
pub use stream::{FilterStream, StreamKindMask};
pub use voxel_stream::{VoxelDenseStream, VoxelSparseStream};
