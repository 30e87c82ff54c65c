use core_geom::Point3D;

/// A perspective look-at camera. The state file tags this kind
/// `persplookat`; no other camera kind is defined yet, but the tag is kept
/// explicit on the value rather than assumed by the writer so a second kind
/// can be added without touching every camera in existence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub eye: Point3D,
    pub target: Point3D,
    pub up: Point3D,
    pub fov_deg: f32,
}

impl Camera {
    pub const TAG: &'static str = "persplookat";

    pub fn new(eye: Point3D, target: Point3D, up: Point3D, fov_deg: f32) -> Self {
        Self { eye, target, up, fov_deg }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Point3D::new(0.0, 0.0, 10.0),
            target: Point3D::ZERO,
            up: Point3D::new(0.0, 1.0, 0.0),
            fov_deg: 45.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera_looks_at_origin_from_positive_z() {
        let c = Camera::default();
        assert_eq!(c.target, Point3D::ZERO);
        assert!(c.eye.z > 0.0);
    }
}
