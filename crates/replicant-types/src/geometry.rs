//! Geometry primitives shared by every replicant crate.
//!
//! Conventions follow the simulator: `+y` is up, `+z` is the agent's
//! forward axis and `+x` its right.  Angles at API boundaries are degrees;
//! a positive yaw turns the forward axis toward `+x` (clockwise seen from
//! above).

use std::ops::{Add, Mul, Neg, Sub};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector or point, serialised as an `{"x", "y", "z"}` object.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// Local forward axis.
    pub const FORWARD: Vec3 = Vec3::new(0.0, 0.0, 1.0);
    /// Local up axis.
    pub const UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);
    /// Local right axis.
    pub const RIGHT: Vec3 = Vec3::new(1.0, 0.0, 0.0);

    /// Create a new vector.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    /// Unit vector in the same direction, or zero for a (near) zero vector.
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            Self::zero()
        } else {
            self * (1.0 / len)
        }
    }

    /// Projection onto the horizontal (`y = 0`) plane.
    pub fn horizontal(self) -> Self {
        Self::new(self.x, 0.0, self.z)
    }

    /// Linear interpolation; `t` is not clamped.
    pub fn lerp(self, to: Self, t: f32) -> Self {
        self + (to - self) * t
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
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

    /// Rotation of `degrees` around `axis` (need not be normalised).
    pub fn from_axis_angle(axis: Vec3, degrees: f32) -> Self {
        let axis = axis.normalized();
        let half = degrees.to_radians() * 0.5;
        let s = half.sin();
        Self::new(half.cos(), axis.x * s, axis.y * s, axis.z * s)
    }

    /// Rotation of `degrees` around the up axis.
    pub fn from_yaw(degrees: f32) -> Self {
        Self::from_axis_angle(Vec3::UP, degrees)
    }

    /// Hamilton product: compose two rotations (`rhs` applied first).
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

    pub fn dot(self, rhs: Self) -> f32 {
        self.w * rhs.w + self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn normalized(self) -> Self {
        let len = self.dot(self).sqrt();
        if len <= f32::EPSILON {
            Self::identity()
        } else {
            Self::new(self.w / len, self.x / len, self.y / len, self.z / len)
        }
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// The rotated forward axis.
    pub fn forward(self) -> Vec3 {
        self.rotate(Vec3::FORWARD)
    }

    /// Heading of the rotated forward axis around the up axis, in degrees
    /// within `(-180, 180]`.
    pub fn yaw(self) -> f32 {
        let f = self.forward();
        f.x.atan2(f.z).to_degrees()
    }

    /// Smallest angle in degrees between two orientations.
    pub fn angle_to(self, other: Self) -> f32 {
        let d = self.normalized().dot(other.normalized()).abs().min(1.0);
        (2.0 * d.acos()).to_degrees()
    }

    /// Spherical interpolation along the shortest arc; `t` is clamped to
    /// `[0, 1]`.
    pub fn slerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mut to = to;
        let mut cos = self.dot(to);
        if cos < 0.0 {
            to = Self::new(-to.w, -to.x, -to.y, -to.z);
            cos = -cos;
        }
        if cos > 0.9995 {
            // Nearly parallel: fall back to normalised lerp.
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
}
