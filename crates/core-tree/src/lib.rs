//! The filter tree: ordered forest structure, stable external handles,
//! undo/redo, and the single-writer refresh lock.

mod error;
mod handle;
mod node_id;
mod state;
mod tree;
mod undo;

pub use error::TreeError;
pub use handle::{FilterHandle, HandleMap};
pub use node_id::NodeId;
pub use state::TreeState;
pub use tree::FilterTree;
pub use undo::{UndoEngine, UNDO_DEPTH_MAX};
