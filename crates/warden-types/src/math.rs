//! Minimal 3-D math shared by every Warden crate.
//!
//! World coordinates follow the simulation host's convention: `y` is up and
//! a rotation of identity faces along `+z`.
//!
//! # Example
//!
//! ```rust
//! use warden_types::math::{Quaternion, Vec3};
//!
//! let facing = Quaternion::look_rotation(Vec3::new(1.0, 0.0, 0.0)).unwrap();
//! let forward = facing.rotate(Vec3::FORWARD);
//! assert!((forward.x - 1.0).abs() < 1e-5);
//! ```

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Vectors shorter than this are treated as zero when normalising.
const NORMALIZE_EPSILON: f32 = 1e-5;

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A point or direction in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const UP: Self = Self::new(0.0, 1.0, 0.0);
    pub const FORWARD: Self = Self::new(0.0, 0.0, 1.0);

    /// Create a new vector.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Dot product.
    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// Euclidean length.
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Distance between two points.
    pub fn distance(self, other: Self) -> f32 {
        (other - self).length()
    }

    /// Unit vector in the same direction, or [`Vec3::ZERO`] when the vector
    /// is too short to carry a direction.
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len > NORMALIZE_EPSILON {
            self * (1.0 / len)
        } else {
            Self::ZERO
        }
    }

    /// Copy of `self` raised by `dy` along the up axis.
    pub fn raised(self, dy: f32) -> Self {
        Self::new(self.x, self.y + dy, self.z)
    }

    /// Linear interpolation; `t` is not clamped.
    pub fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }

    /// `true` when every component is within `eps` of `other`'s.
    pub fn approx_eq(self, other: Self, eps: f32) -> bool {
        (self.x - other.x).abs() <= eps
            && (self.y - other.y).abs() <= eps
            && (self.z - other.z).abs() <= eps
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `angle_rad` about a unit `axis`.
    pub fn from_axis_angle(axis: Vec3, angle_rad: f32) -> Self {
        let (s, c) = (angle_rad * 0.5).sin_cos();
        Self::new(c, axis.x * s, axis.y * s, axis.z * s)
    }

    /// Rotation whose forward axis (`+z`) points along `forward`, keeping
    /// `+y` as up.  Returns `None` for a zero-length direction.
    pub fn look_rotation(forward: Vec3) -> Option<Self> {
        let f = forward.normalized();
        if f == Vec3::ZERO {
            return None;
        }
        let yaw = f.x.atan2(f.z);
        let pitch = (-f.y).atan2((f.x * f.x + f.z * f.z).sqrt());
        let yaw_q = Self::from_axis_angle(Vec3::UP, yaw);
        let pitch_q = Self::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), pitch);
        Some(yaw_q.mul(pitch_q))
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    fn dot(self, rhs: Self) -> f32 {
        self.w * rhs.w + self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    fn normalized(self) -> Self {
        let len = self.dot(self).sqrt();
        if len <= f32::EPSILON {
            return Self::identity();
        }
        Self::new(self.w / len, self.x / len, self.y / len, self.z / len)
    }

    /// Spherical interpolation along the shortest arc.  `t` is clamped to
    /// `[0, 1]`.
    pub fn slerp(self, target: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mut to = target;
        let mut cos = self.dot(to);
        if cos < 0.0 {
            to = Self::new(-to.w, -to.x, -to.y, -to.z);
            cos = -cos;
        }

        // Nearly parallel: fall back to normalised lerp.
        if cos > 0.9995 {
            return Self::new(
                self.w + (to.w - self.w) * t,
                self.x + (to.x - self.x) * t,
                self.y + (to.y - self.y) * t,
                self.z + (to.z - self.z) * t,
            )
            .normalized();
        }

        let theta = cos.acos();
        let sin = theta.sin();
        let a = ((1.0 - t) * theta).sin() / sin;
        let b = (t * theta).sin() / sin;
        Self::new(
            a * self.w + b * to.w,
            a * self.x + b * to.x,
            a * self.y + b * to.y,
            a * self.z + b * to.z,
        )
    }

    /// Angle in radians between two orientations, from the relative
    /// rotation `self * other⁻¹`.
    pub fn angle_to(self, other: Self) -> f32 {
        let r = self.mul(other.conjugate());
        let v = (r.x * r.x + r.y * r.y + r.z * r.z).sqrt();
        2.0 * v.atan2(r.w.abs())
    }
}
