//! Rigid-body transforms and angle helpers.
//!
//! A [`Transform3D`] relates an agent's local frame to the world frame.
//! Actions use it to turn local offsets (hand targets, drop offsets) into
//! world points and world points back into the agent's frame (bearings,
//! head look rotations).
//!
//! # Example
//!
//! ```rust
//! use replicant_perception::transform::Transform3D;
//! use replicant_types::{Quaternion, Vec3};
//!
//! // Agent 1 m right of the origin, facing +x.
//! let agent = Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::from_yaw(90.0));
//!
//! // Half a metre ahead of the agent, in world space.
//! let p = agent.transform_point(Vec3::new(0.0, 0.0, 0.5));
//! assert!((p.x - 1.5).abs() < 1e-5);
//! ```

use replicant_types::{Pose, Quaternion, Vec3};

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: rotation followed by translation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `rotation` then add
/// `translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Compose two transforms: if `self` = T_A_B and `other` = T_B_C, the
    /// result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation + self.rotation.rotate(other.translation);
        let rotated = self.rotation.mul(other.rotation);
        Self::new(translated, rotated)
    }

    /// The inverse transform (T_B_A for T_A_B).
    pub fn inverse(self) -> Self {
        let inv = self.rotation.conjugate();
        Self::new(-inv.rotate(self.translation), inv)
    }

    /// Map a point from frame B into frame A.
    pub fn transform_point(self, p: Vec3) -> Vec3 {
        self.translation + self.rotation.rotate(p)
    }

    /// Map a point from frame A into frame B.
    pub fn inverse_transform_point(self, p: Vec3) -> Vec3 {
        self.rotation.conjugate().rotate(p - self.translation)
    }
}

impl From<Pose> for Transform3D {
    fn from(pose: Pose) -> Self {
        Self::new(pose.position, pose.rotation)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Angles
// ────────────────────────────────────────────────────────────────────────────

/// Wrap an angle in degrees into `(-180, 180]`.
pub fn wrap_degrees(angle: f32) -> f32 {
    let mut a = angle % 360.0;
    if a > 180.0 {
        a -= 360.0;
    } else if a <= -180.0 {
        a += 360.0;
    }
    a
}

/// Signed yaw in degrees that turns `pose` to face `point`.  Positive values
/// turn toward the agent's right.  Returns `0` when the point coincides with
/// the agent's position.
pub fn bearing_to(pose: &Pose, point: Vec3) -> f32 {
    let local = Transform3D::from(*pose).inverse_transform_point(point).horizontal();
    if local.length() <= f32::EPSILON {
        return 0.0;
    }
    local.x.atan2(local.z).to_degrees()
}

/// Horizontal distance between two points.
pub fn horizontal_distance(a: Vec3, b: Vec3) -> f32 {
    (a - b).horizontal().length()
}

/// Rotation whose forward axis points along `direction` with no roll.
/// Positive pitch looks down, so an upward direction yields a negative pitch.
pub fn look_rotation(direction: Vec3) -> Quaternion {
    let horizontal = direction.horizontal().length();
    if direction.length() <= f32::EPSILON {
        return Quaternion::identity();
    }
    let yaw = direction.x.atan2(direction.z).to_degrees();
    let pitch = -direction.y.atan2(horizontal).to_degrees();
    Quaternion::from_yaw(yaw).mul(Quaternion::from_axis_angle(Vec3::RIGHT, pitch))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        a.distance(b) < 1e-4
    }

    // ── Transform3D ─────────────────────────────────────────────────────────

    #[test]
    fn transform_identity_compose_is_noop() {
        let t = Transform3D::new(Vec3::new(1.0, 2.0, 3.0), Quaternion::identity());
        let composed = Transform3D::identity().compose(t);
        assert!(approx(composed.translation, Vec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn transform_compose_respects_rotation() {
        // Base faces +x; a point 1 m ahead in the base frame lands on +x.
        let base = Transform3D::new(Vec3::zero(), Quaternion::from_yaw(90.0));
        let hand = Transform3D::new(Vec3::new(0.0, 0.0, 1.0), Quaternion::identity());
        let t = base.compose(hand);
        assert!(approx(t.translation, Vec3::new(1.0, 0.0, 0.0)), "{:?}", t.translation);
    }

    #[test]
    fn inverse_round_trips_points() {
        let t = Transform3D::new(Vec3::new(2.0, 0.0, -1.0), Quaternion::from_yaw(35.0));
        let p = Vec3::new(0.3, 1.2, 0.7);
        assert!(approx(t.inverse_transform_point(t.transform_point(p)), p));
        assert!(approx(t.inverse().transform_point(t.transform_point(p)), p));
    }

    // ── Angles ──────────────────────────────────────────────────────────────

    #[test]
    fn wrap_degrees_into_half_open_range() {
        assert_eq!(wrap_degrees(190.0), -170.0);
        assert_eq!(wrap_degrees(-190.0), 170.0);
        assert_eq!(wrap_degrees(180.0), 180.0);
        assert_eq!(wrap_degrees(-180.0), 180.0);
        assert_eq!(wrap_degrees(720.0 + 10.0), 10.0);
    }

    #[test]
    fn bearing_to_point_on_the_right_is_positive() {
        let pose = Pose::default();
        assert!((bearing_to(&pose, Vec3::new(1.0, 0.0, 0.0)) - 90.0).abs() < 1e-3);
        assert!((bearing_to(&pose, Vec3::new(-1.0, 0.0, 0.0)) + 90.0).abs() < 1e-3);
        assert_eq!(bearing_to(&pose, Vec3::zero()), 0.0);
    }

    #[test]
    fn bearing_accounts_for_current_heading() {
        let pose = Pose::new(Vec3::zero(), Quaternion::from_yaw(90.0));
        assert!(bearing_to(&pose, Vec3::new(1.0, 0.0, 0.0)).abs() < 1e-3);
    }

    #[test]
    fn look_rotation_points_forward_axis() {
        let dir = Vec3::new(1.0, 1.0, 1.0).normalized();
        let q = look_rotation(dir);
        assert!(approx(q.forward(), dir), "{:?}", q.forward());
        assert_eq!(look_rotation(Vec3::zero()), Quaternion::identity());
    }
}
