use std::fmt;
use std::ops::{Add, Div, Index, Mul, Sub};

use glam::{Quat, Vec3A};
use thiserror::Error;

/// A point (or vector) in 3-space, stored as three `f32`s.
///
/// Values flow through the filter graph by the million, so this stays a
/// plain `Copy` value type rather than anything heap-backed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Point3DParseError {
    #[error("expected 3 components, found {0}")]
    WrongComponentCount(usize),
    #[error("could not parse component {0:?} as a float")]
    BadComponent(String),
}

impl Point3D {
    pub const ZERO: Point3D = Point3D { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(&self, o: &Point3D) -> f32 {
        self.x * o.x + self.y * o.y + self.z * o.z
    }

    pub fn cross(&self, o: &Point3D) -> Point3D {
        Point3D::new(
            self.y * o.z - self.z * o.y,
            self.z * o.x - self.x * o.z,
            self.x * o.y - self.y * o.x,
        )
    }

    pub fn sqr_dist(&self, o: &Point3D) -> f32 {
        (*self - *o).sqr_mag()
    }

    pub fn sqr_mag(&self) -> f32 {
        self.dot(self)
    }

    pub fn magnitude(&self) -> f32 {
        self.sqr_mag().sqrt()
    }

    /// Returns a unit vector in the same direction, or `None` for a
    /// (near-)zero vector rather than dividing into NaN/Inf.
    pub fn normalized(&self) -> Option<Point3D> {
        let mag = self.magnitude();
        if mag <= f32::EPSILON {
            None
        } else {
            Some(*self / mag)
        }
    }

    /// Rotate this point about `axis` by `angle_rad`, using `axis` as an
    /// unnormalized rotation axis (normalized internally).
    pub fn rotate(&self, axis: Point3D, angle_rad: f32) -> Point3D {
        let axis = axis.normalized().unwrap_or(Point3D::new(0.0, 0.0, 1.0));
        let q = Quat::from_axis_angle(axis.to_glam(), angle_rad);
        Point3D::from_glam(q * self.to_glam())
    }

    pub fn rotate_by_quat(&self, q: Quat) -> Point3D {
        Point3D::from_glam(q * self.to_glam())
    }

    fn to_glam(self) -> Vec3A {
        Vec3A::new(self.x, self.y, self.z)
    }

    fn from_glam(v: Vec3A) -> Point3D {
        Point3D::new(v.x, v.y, v.z)
    }

    /// Parse either a space-delimited (`"1.0 2.0 3.0"`) or a comma-delimited
    /// (`"1.0,2.0,3.0"`) triplet.
    pub fn parse(s: &str) -> Result<Point3D, Point3DParseError> {
        let sep = if s.contains(',') { ',' } else { ' ' };
        let parts: Vec<&str> = s.split(sep).map(str::trim).filter(|p| !p.is_empty()).collect();
        if parts.len() != 3 {
            return Err(Point3DParseError::WrongComponentCount(parts.len()));
        }
        let mut v = [0f32; 3];
        for (i, p) in parts.iter().enumerate() {
            v[i] = p
                .parse::<f32>()
                .map_err(|_| Point3DParseError::BadComponent((*p).to_string()))?;
        }
        Ok(Point3D::new(v[0], v[1], v[2]))
    }
}

impl fmt::Display for Point3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.z)
    }
}

impl Index<usize> for Point3D {
    type Output = f32;
    fn index(&self, i: usize) -> &f32 {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("Point3D index {i} out of range"),
        }
    }
}

impl Add for Point3D {
    type Output = Point3D;
    fn add(self, o: Point3D) -> Point3D {
        Point3D::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl Sub for Point3D {
    type Output = Point3D;
    fn sub(self, o: Point3D) -> Point3D {
        Point3D::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl Mul<f32> for Point3D {
    type Output = Point3D;
    fn mul(self, s: f32) -> Point3D {
        Point3D::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Mul<Point3D> for Point3D {
    type Output = Point3D;
    /// Component-wise product, used by voxel pitch scaling.
    fn mul(self, o: Point3D) -> Point3D {
        Point3D::new(self.x * o.x, self.y * o.y, self.z * o.z)
    }
}

impl Div<f32> for Point3D {
    type Output = Point3D;
    fn div(self, s: f32) -> Point3D {
        Point3D::new(self.x / s, self.y / s, self.z / s)
    }
}

impl Div<Point3D> for Point3D {
    type Output = Point3D;
    fn div(self, o: Point3D) -> Point3D {
        Point3D::new(self.x / o.x, self.y / o.y, self.z / o.z)
    }
}
