//! Visualization glue: the renderer-facing `Drawable` contract, a shared
//! texture pool, and the selection-binding drag math that turns a mouse
//! gesture into a filter parameter change. No rendering backend lives
//! here — `DrawCommand` describes what to draw, it never draws it.

mod drawable;
mod projection;
mod texture_pool;

pub use drawable::{DrawCommand, Drawable, ParamDelta};
pub use projection::{camera_basis, project_drag};
pub use texture_pool::{TextureId, TexturePool};
