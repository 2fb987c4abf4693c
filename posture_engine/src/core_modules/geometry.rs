// THEORY:
// The `geometry` module is the lowest layer of the engine. It knows nothing
// about bodies or posture; it only measures the angle at a vertex between two
// rays. Everything above it (the angle deriver, the scorer) builds on this
// single, pure measurement.
//
// Key architectural principles:
// 1.  **Purity**: Every function here is deterministic and side-effect free.
// 2.  **Explicit Degeneracy**: A zero-length ray is reported as
//     `GeometryError::Degenerate`. It is never coerced to 0°, since 0° is a
//     real answer ("perfectly aligned").
// 3.  **Numerical Safety**: The cosine is clamped to [-1, 1] before `acos`,
//     because rounding can push it a hair outside the domain.

use crate::error::GeometryError;
use serde::{Deserialize, Serialize};
use std::ops::Sub;

/// Vectors shorter than this are treated as zero-length.
const MIN_RAY_LENGTH: f64 = 1e-12;

/// A point (or direction vector) in normalized image space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// A 2D point, lifted into 3D with `z = 0`.
    pub const fn planar(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub fn dot(&self, other: &Point3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Returns this point shifted by `dy` along the image's vertical axis only.
    pub fn offset_y(&self, dy: f64) -> Point3 {
        Point3 {
            y: self.y + dy,
            ..*self
        }
    }
}

impl Sub for Point3 {
    type Output = Point3;

    fn sub(self, rhs: Point3) -> Point3 {
        Point3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// The angle in degrees at vertex `b` between rays `b→a` and `b→c`.
pub fn angle(a: Point3, b: Point3, c: Point3) -> Result<f64, GeometryError> {
    angle_between(a - b, c - b)
}

/// The angle in degrees between two direction vectors, in `[0, 180]`.
pub fn angle_between(u: Point3, v: Point3) -> Result<f64, GeometryError> {
    let norm_u = u.norm();
    let norm_v = v.norm();
    if norm_u <= MIN_RAY_LENGTH || norm_v <= MIN_RAY_LENGTH {
        return Err(GeometryError::Degenerate);
    }

    let cosine = (u.dot(&v) / (norm_u * norm_v)).clamp(-1.0, 1.0);
    Ok(cosine.acos().to_degrees())
}
