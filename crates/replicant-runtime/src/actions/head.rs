//! Head control: [`LookAt`], [`RotateHead`], [`ResetHead`].
//!
//! Head motion is kinematic and never collides.  Rotations are in the
//! agent's local frame; the head is slerped from its starting rotation to
//! the goal over the profile's frames and succeeds once the reported
//! rotation is within [`HEAD_ALIGNED_DEGREES`] of the goal.

use replicant_kernel::motion::{MotionProfile, REFERENCE_TICK_RATE};
use replicant_kernel::Easing;
use replicant_perception::transform::{look_rotation, Transform3D};
use replicant_perception::TargetResolver;
use replicant_types::{
    Axis, Instruction, Quaternion, ReplicantError, Target, Vec3, HEAD_HEIGHT,
};
use serde::{Deserialize, Serialize};

use super::{Hands, Step, TickContext};

/// Success tolerance for head rotations, in degrees.
pub const HEAD_ALIGNED_DEGREES: f32 = 0.5;

/// Timing of a head motion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadParams {
    pub duration: f32,
    pub scale_duration: bool,
    pub easing: Easing,
}

impl Default for HeadParams {
    fn default() -> Self {
        Self {
            duration: 0.1,
            scale_duration: true,
            easing: Easing::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct HeadMotion {
    params: HeadParams,
    profile: MotionProfile,
    start: Option<Quaternion>,
    frame: u32,
}

impl HeadMotion {
    fn new(params: HeadParams) -> Result<Self, ReplicantError> {
        let profile = MotionProfile::new(
            params.duration,
            params.scale_duration,
            REFERENCE_TICK_RATE,
            params.easing,
        )?;
        Ok(Self {
            params,
            profile,
            start: None,
            frame: 0,
        })
    }

    /// Starting head rotation, captured on the first tick.
    fn start(&mut self, ctx: &TickContext<'_>) -> Quaternion {
        if let Some(start) = self.start {
            return start;
        }
        if let Ok(profile) = MotionProfile::new(
            self.params.duration,
            self.params.scale_duration,
            ctx.tick_rate,
            self.params.easing,
        ) {
            self.profile = profile;
        }
        *self.start.insert(ctx.body.head_rotation)
    }

    fn step(&mut self, ctx: &TickContext<'_>, goal: Quaternion) -> Step {
        let start = self.start(ctx);
        if ctx.body.head_rotation.angle_to(goal) <= HEAD_ALIGNED_DEGREES {
            return Step::success(Vec::new());
        }
        self.frame += 1;
        let rotation = if self.profile.is_complete(self.frame) {
            goal
        } else {
            start.slerp(goal, self.profile.progress(self.frame))
        };
        Step::running(vec![Instruction::SetHeadRotation {
            id: ctx.agent_id,
            rotation,
        }])
    }
}

/// Turn the head to look at a target.  Object targets are tracked every
/// tick.
#[derive(Debug, Clone)]
pub struct LookAt {
    target: Target,
    motion: HeadMotion,
}

impl LookAt {
    pub fn new(target: impl Into<Target>, params: HeadParams) -> Result<Self, ReplicantError> {
        Ok(Self {
            target: target.into(),
            motion: HeadMotion::new(params)?,
        })
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub(crate) fn update(&mut self, ctx: &TickContext<'_>, _hands: &mut Hands) -> Step {
        let resolved = match TargetResolver::resolve(&self.target, ctx.world) {
            Ok(r) => r,
            Err(reason) => return Step::failure(reason),
        };
        let body = Transform3D::new(ctx.body.position, ctx.body.rotation);
        let eye = Vec3::UP * HEAD_HEIGHT;
        let direction = body.inverse_transform_point(resolved.position) - eye;
        self.motion.step(ctx, look_rotation(direction))
    }
}

/// Rotate the head by `angle` degrees around one axis, relative to where
/// it started.
#[derive(Debug, Clone)]
pub struct RotateHead {
    axis: Axis,
    angle: f32,
    motion: HeadMotion,
}

impl RotateHead {
    pub fn new(axis: Axis, angle: f32, params: HeadParams) -> Result<Self, ReplicantError> {
        if !angle.is_finite() {
            return Err(ReplicantError::invalid("angle", "must be finite"));
        }
        Ok(Self {
            axis,
            angle,
            motion: HeadMotion::new(params)?,
        })
    }

    pub(crate) fn update(&mut self, ctx: &TickContext<'_>, _hands: &mut Hands) -> Step {
        let start = self.motion.start(ctx);
        let goal = start.mul(Quaternion::from_axis_angle(self.axis.vector(), self.angle));
        self.motion.step(ctx, goal)
    }
}

/// Return the head to face straight ahead.
#[derive(Debug, Clone)]
pub struct ResetHead {
    motion: HeadMotion,
}

impl ResetHead {
    pub fn new(params: HeadParams) -> Result<Self, ReplicantError> {
        Ok(Self {
            motion: HeadMotion::new(params)?,
        })
    }

    pub(crate) fn update(&mut self, ctx: &TickContext<'_>, _hands: &mut Hands) -> Step {
        self.motion.step(ctx, Quaternion::identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::{body_frame, Harness};
    use crate::actions::Action;
    use replicant_types::{ActionStatus, ResponseFrame};

    fn with_head(head_rotation: Quaternion) -> ResponseFrame {
        match body_frame(Vec3::zero(), 0.0) {
            ResponseFrame::Replicant {
                id,
                position,
                rotation,
                left_hand,
                right_hand,
                ..
            } => ResponseFrame::Replicant {
                id,
                position,
                rotation,
                left_hand,
                right_hand,
                head_rotation,
            },
            other => other,
        }
    }

    fn commanded(step: &Step) -> Quaternion {
        match step.instructions.as_slice() {
            [Instruction::SetHeadRotation { rotation, .. }] => *rotation,
            other => panic!("unexpected instructions {other:?}"),
        }
    }

    #[test]
    fn rotate_head_slerps_then_succeeds() {
        let mut h = Harness::new(vec![with_head(Quaternion::identity())]);
        let params = HeadParams {
            duration: 0.0625,
            scale_duration: false,
            easing: Easing::Linear,
        };
        let mut action = Action::new(RotateHead::new(Axis::Yaw, 45.0, params).unwrap());

        let mut last = Quaternion::identity();
        for frame in 1..=4 {
            let step = h.step(&mut action);
            assert_eq!(step.status, ActionStatus::Ongoing);
            last = commanded(&step);
            assert!((last.yaw() - 11.25 * frame as f32).abs() < 1e-2);
        }
        h.set_frames(vec![with_head(last)]);
        assert_eq!(h.step(&mut action).status, ActionStatus::Success);
    }

    #[test]
    fn reset_head_at_identity_succeeds_immediately() {
        let mut h = Harness::new(vec![with_head(Quaternion::identity())]);
        let mut action = Action::new(ResetHead::new(HeadParams::default()).unwrap());
        let step = h.step(&mut action);
        assert_eq!(step.status, ActionStatus::Success);
        assert!(step.instructions.is_empty());
    }

    #[test]
    fn look_at_points_the_head_down_toward_low_targets() {
        let mut h = Harness::new(vec![with_head(Quaternion::identity())]);
        let params = HeadParams {
            duration: 0.015625,
            scale_duration: false,
            easing: Easing::Linear,
        };
        let target = Vec3::new(0.0, 0.0, HEAD_HEIGHT);
        let mut action = Action::new(LookAt::new(target, params).unwrap());
        let rotation = commanded(&h.step(&mut action));
        let forward = rotation.forward();
        assert!(forward.y < -0.7 && forward.z > 0.7);
        assert!(forward.x.abs() < 1e-4);

        h.set_frames(vec![with_head(rotation)]);
        assert_eq!(h.step(&mut action).status, ActionStatus::Success);
    }

    #[test]
    fn non_finite_angle_is_rejected() {
        assert!(RotateHead::new(Axis::Roll, f32::INFINITY, HeadParams::default()).is_err());
    }
}
