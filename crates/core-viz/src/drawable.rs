use core_analysis::Camera;
use core_filter::{ModifierMask, SelectionBinding};
use core_geom::BoundCube;
use core_geom::Point3D;
use core_stream::{ColourBar, DrawPrimitive};

use crate::projection::project_drag;
use crate::texture_pool::TexturePool;
use crate::TextureId;

/// A renderer-agnostic description of one draw call, emitted by
/// `Drawable::draw`. The renderer this crate hands commands to decides how
/// `TexturedQuad`'s `texture` id gets bound; this crate never issues GL (or
/// any other backend's) calls itself.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Points { positions: Vec<Point3D>, colour: (f32, f32, f32, f32), size: f32 },
    TexturedQuad { origin: Point3D, u_axis: Point3D, v_axis: Point3D, texture: TextureId, colour_bar: Option<ColourBar> },
    Text { origin: Point3D, text: String, colour: (f32, f32, f32, f32) },
    Arrow { start: Point3D, end: Point3D, colour: (f32, f32, f32, f32), width: f32 },
}

impl DrawCommand {
    /// Lower a `DrawPrimitive` (the ephemeral per-refresh data contract
    /// `core-stream` carries) into a `DrawCommand`, uploading any raw pixel
    /// data into `pool` along the way so a `Drawable` only ever holds a
    /// `TextureId` between frames, never the image itself.
    pub fn from_primitive(prim: DrawPrimitive, pool: &TexturePool) -> DrawCommand {
        match prim {
            DrawPrimitive::Points { positions, colour, size } => DrawCommand::Points { positions, colour, size },
            DrawPrimitive::TexturedQuad { origin, u_axis, v_axis, image, colour_bar } => {
                DrawCommand::TexturedQuad { origin, u_axis, v_axis, texture: pool.insert(image), colour_bar }
            }
            DrawPrimitive::Text { origin, text, colour } => DrawCommand::Text { origin, text, colour },
            DrawPrimitive::Arrow { start, end, colour, width } => DrawCommand::Arrow { start, end, colour, width },
        }
    }
}

/// A change a selection-binding drag resolves to, handed to the target
/// filter's property-setting path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDelta {
    Float(f32),
    Point(Point3D),
    Rotation { axis: Point3D, angle_rad: f32 },
}

/// The behavioural wrapper around a drawn object that a viewer keeps across
/// frames: where it sits in space, whether it wants lighting or depth
/// sorting, and how a drag on it should be interpreted. Drawables never own
/// textures directly (see `TexturePool`); they request an id from the pool
/// when their draw data changes and release it when dropped.
pub trait Drawable: Send {
    fn bounding_box(&self) -> BoundCube;

    fn wants_lighting(&self) -> bool {
        false
    }

    fn needs_depth_sort(&self) -> bool {
        false
    }

    fn selectable(&self) -> bool {
        false
    }

    /// Screen-space (not world-space) overlays, e.g. a colour bar legend.
    fn is_overlay(&self) -> bool {
        false
    }

    fn draw(&mut self, pool: &TexturePool) -> DrawCommand;

    /// Converts a drag gesture matched by `binding` into a parameter delta,
    /// projecting the 2D drag through `camera`'s basis. The default just
    /// defers to `project_drag`; a drawable with unusual semantics (e.g. a
    /// screen-space overlay with no 3D basis to project onto) can override
    /// this entirely.
    fn recompute_params(&self, binding: &SelectionBinding, camera: &Camera, modifiers: ModifierMask, drag: (f32, f32)) -> Option<ParamDelta> {
        project_drag(binding, camera, modifiers, drag.0, drag.1)
    }

    /// Called when the drawable is dropped (or its draw data is about to be
    /// replaced) so its texture slot, if any, can be freed.
    fn release_textures(&mut self, _pool: &TexturePool) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_geom::BoundCube;
    use core_stream::SliceImage;

    struct SliceDrawable {
        origin: Point3D,
        image: Option<SliceImage>,
        texture: Option<TextureId>,
    }

    impl Drawable for SliceDrawable {
        fn bounding_box(&self) -> BoundCube {
            BoundCube::new(self.origin, self.origin + Point3D::new(1.0, 1.0, 0.0))
        }

        fn wants_lighting(&self) -> bool {
            false
        }

        fn draw(&mut self, pool: &TexturePool) -> DrawCommand {
            let prim = DrawPrimitive::TexturedQuad {
                origin: self.origin,
                u_axis: Point3D::new(1.0, 0.0, 0.0),
                v_axis: Point3D::new(0.0, 1.0, 0.0),
                image: self.image.take().expect("draw called twice without a fresh image"),
                colour_bar: None,
            };
            let cmd = DrawCommand::from_primitive(prim, pool);
            if let DrawCommand::TexturedQuad { texture, .. } = cmd {
                self.texture = Some(texture);
            }
            cmd
        }

        fn release_textures(&mut self, pool: &TexturePool) {
            if let Some(id) = self.texture.take() {
                pool.release(id);
            }
        }
    }

    #[test]
    fn drawing_uploads_the_image_and_releasing_frees_the_slot() {
        let pool = TexturePool::new();
        let mut drawable = SliceDrawable {
            origin: Point3D::ZERO,
            image: Some(SliceImage { width: 1, height: 1, rgba: vec![[255, 0, 0, 255]] }),
            texture: None,
        };
        let cmd = drawable.draw(&pool);
        assert!(matches!(cmd, DrawCommand::TexturedQuad { .. }));
        assert_eq!(pool.len(), 1);

        drawable.release_textures(&pool);
        assert!(pool.is_empty());
    }
}
