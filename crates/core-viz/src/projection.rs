use core_analysis::Camera;
use core_filter::{InteractionMode, ModifierMask, SelectionBinding};
use core_geom::Point3D;

use crate::drawable::ParamDelta;

/// The camera's right/up/forward unit vectors, derived from its look-at
/// fields. `None` if `eye == target` or `up` is parallel to the view
/// direction (no well-defined basis).
pub fn camera_basis(camera: &Camera) -> Option<(Point3D, Point3D, Point3D)> {
    let forward = (camera.target - camera.eye).normalized()?;
    let right = forward.cross(&camera.up).normalized()?;
    let up = right.cross(&forward).normalized()?;
    Some((right, up, forward))
}

/// Projects a 2D drag vector into the bound parameter's delta, using
/// `camera`'s basis to pick 3D direction and `binding`'s mode to decide how
/// to shape it. Modifier keys select which camera-space axes the drag maps
/// onto: CTRL moves along the forward axis ("forward"), ALT moves along the
/// right axis only ("across"), and no relevant modifier spreads the drag
/// over the full view plane ("in-plane").
pub fn project_drag(binding: &SelectionBinding, camera: &Camera, modifiers: ModifierMask, drag_x: f32, drag_y: f32) -> Option<ParamDelta> {
    let (right, up, forward) = camera_basis(camera)?;

    let (world, scalar) = if modifiers.contains(ModifierMask::CTRL) {
        (forward * drag_y, drag_y)
    } else if modifiers.contains(ModifierMask::ALT) {
        (right * drag_x, drag_x)
    } else {
        (right * drag_x + up * -drag_y, drag_y)
    };

    Some(match binding.mode {
        InteractionMode::FloatScale | InteractionMode::FloatTranslate => {
            ParamDelta::Float(scalar.clamp(binding.scalar_min, binding.scalar_max))
        }
        InteractionMode::Point3DTranslate | InteractionMode::Point3DScale => ParamDelta::Point(world),
        InteractionMode::Point3DRotate => ParamDelta::Rotation { axis: up, angle_rad: drag_x },
        InteractionMode::Point3DRotateLockedMagnitude => ParamDelta::Rotation { axis: forward, angle_rad: drag_x },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_filter::MouseButtonMask;

    fn binding(mode: InteractionMode) -> SelectionBinding {
        SelectionBinding {
            mouse_buttons: MouseButtonMask::LEFT,
            modifiers: ModifierMask::empty(),
            mode,
            scalar_min: -10.0,
            scalar_max: 10.0,
            target_node: 0,
            action_id: 1,
        }
    }

    #[test]
    fn basis_of_default_camera_is_right_handed() {
        let camera = Camera::default();
        let (right, up, forward) = camera_basis(&camera).unwrap();
        assert!((right.x - 1.0).abs() < 1e-5 && right.y.abs() < 1e-5 && right.z.abs() < 1e-5);
        assert!((up.y - 1.0).abs() < 1e-5);
        assert!((forward.z + 1.0).abs() < 1e-5);
    }

    #[test]
    fn degenerate_camera_has_no_basis() {
        let camera = Camera::new(Point3D::ZERO, Point3D::ZERO, Point3D::new(0.0, 1.0, 0.0), 45.0);
        assert!(camera_basis(&camera).is_none());
    }

    #[test]
    fn in_plane_drag_translates_along_right_and_up() {
        let camera = Camera::default();
        let delta = project_drag(&binding(InteractionMode::Point3DTranslate), &camera, ModifierMask::empty(), 1.0, 0.0).unwrap();
        assert_eq!(delta, ParamDelta::Point(Point3D::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn ctrl_modifier_moves_along_forward_axis() {
        let camera = Camera::default();
        let delta = project_drag(&binding(InteractionMode::Point3DTranslate), &camera, ModifierMask::CTRL, 0.0, 2.0).unwrap();
        assert_eq!(delta, ParamDelta::Point(Point3D::new(0.0, 0.0, -2.0)));
    }

    #[test]
    fn float_scale_clamps_to_binding_bounds() {
        let camera = Camera::default();
        let delta = project_drag(&binding(InteractionMode::FloatScale), &camera, ModifierMask::empty(), 0.0, 50.0).unwrap();
        assert_eq!(delta, ParamDelta::Float(10.0));
    }
}
