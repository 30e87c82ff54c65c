//! Geometry primitives shared by every filter: a 3D point, an axis-aligned
//! bounding cube, and a seeded RNG handle.
//!
//! `Point3D` and `BoundCube` are plain value types; nothing here owns a
//! stream or a filter. Quaternion rotation is delegated to `glam` rather than
//! hand-rolled, since the rotation math itself carries no domain meaning.

mod bound_cube;
mod point3d;
mod rng;

pub use bound_cube::BoundCube;
pub use point3d::{Point3D, Point3DParseError};
pub use rng::FilterRng;
