//! Wheel-driven locomotion: [`TurnBy`], [`TurnTo`], [`MoveBy`], [`MoveTo`].
//!
//! Every tick a locomotion action runs the collision rules first, then its
//! success predicate, and only then emits fresh wheel values.  Torques come
//! from the caller's [`MoveParams::wheel_values`] when set, otherwise from a
//! [`WheelController`] fed with the remaining angle or distance.

use replicant_hal::WheelController;
use replicant_kernel::collision::CollisionCheck;
use replicant_kernel::motion::{scaled_duration, validate_threshold, MotionProfile, REFERENCE_TICK_RATE};
use replicant_kernel::Easing;
use replicant_perception::transform::{bearing_to, horizontal_distance, wrap_degrees};
use replicant_perception::TargetResolver;
use replicant_types::{
    Arm, FailureReason, Instruction, ObjectId, PathRegion, ReplicantError, Target, Vec3,
    WheelValues,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Hands, MotionSense, Step, TickContext};

/// Thresholds and drive options shared by all locomotion actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveParams {
    /// Linear success tolerance in metres.
    pub arrived_at: f32,
    /// Angular success tolerance in degrees.
    pub aligned_at: f32,
    /// [`MoveTo`] stops this many metres short of the target.
    pub arrived_offset: f32,
    /// Fixed wheel values; derived from the remaining motion when `None`.
    pub wheel_values: Option<WheelValues>,
    /// Send both arms back to neutral on the first tick.
    pub reset_arms: bool,
    pub reset_arms_duration: f32,
    pub scale_reset_arms_duration: bool,
}

impl Default for MoveParams {
    fn default() -> Self {
        Self {
            arrived_at: 0.1,
            aligned_at: 1.0,
            arrived_offset: 0.0,
            wheel_values: None,
            reset_arms: true,
            reset_arms_duration: 0.25,
            scale_reset_arms_duration: true,
        }
    }
}

impl MoveParams {
    fn validate(&self) -> Result<(), ReplicantError> {
        validate_threshold("arrived_at", self.arrived_at)?;
        validate_threshold("aligned_at", self.aligned_at)?;
        validate_threshold("arrived_offset", self.arrived_offset)?;
        if self.wheel_values.is_some_and(|w| !w.is_finite()) {
            return Err(ReplicantError::invalid("wheel_values", "must be finite"));
        }
        if self.reset_arms {
            MotionProfile::new(
                self.reset_arms_duration,
                self.scale_reset_arms_duration,
                REFERENCE_TICK_RATE,
                Easing::Linear,
            )?;
        }
        Ok(())
    }
}

fn finite(name: &str, value: f32) -> Result<f32, ReplicantError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ReplicantError::invalid(name, format!("must be finite, got {value}")))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Drive – state common to every locomotion action
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Drive {
    params: MoveParams,
    controller: WheelController,
    arms_reset: bool,
}

impl Drive {
    fn new(params: MoveParams) -> Result<Self, ReplicantError> {
        params.validate()?;
        Ok(Self {
            params,
            controller: WheelController::new(),
            arms_reset: false,
        })
    }

    /// Run the collision rules for this tick.  Carry-over only applies on
    /// the action's first tick.
    fn check(
        &self,
        ctx: &TickContext<'_>,
        hands: &Hands,
        first: bool,
        sense: MotionSense,
        regions: &[PathRegion],
        anchor: Option<ObjectId>,
    ) -> Result<(), FailureReason> {
        let mut ignored = hands.held_ids();
        ignored.extend(anchor);
        let check = CollisionCheck {
            previous_same_failed: first && ctx.previous_same_failed(sense),
            regions,
            parts: None,
            obstacles: ctx.world.obstacles(ctx.agent_id),
            contacts: ctx.world.contacts(ctx.agent_id),
            ignored: &ignored,
        };
        ctx.evaluator.evaluate(ctx.policy, &check)
    }

    /// Arm resets, sent once with the first wheel command.
    fn reset_arms(&mut self, ctx: &TickContext<'_>) -> Vec<Instruction> {
        if self.arms_reset || !self.params.reset_arms {
            return Vec::new();
        }
        self.arms_reset = true;
        let duration = scaled_duration(
            self.params.reset_arms_duration,
            self.params.scale_reset_arms_duration,
            ctx.tick_rate,
        );
        Arm::BOTH
            .into_iter()
            .map(|arm| Instruction::ResetArm {
                id: ctx.agent_id,
                arm,
                duration,
            })
            .collect()
    }

    fn turn(&mut self, ctx: &TickContext<'_>, remaining: f32) -> Step {
        let wheels = match self.params.wheel_values {
            Some(w) => w,
            None => self.controller.for_turn(remaining),
        };
        self.wheels(ctx, wheels)
    }

    fn drive(&mut self, ctx: &TickContext<'_>, remaining: f32) -> Step {
        let wheels = match self.params.wheel_values {
            Some(w) => w,
            None => self.controller.for_move(remaining),
        };
        self.wheels(ctx, wheels)
    }

    fn wheels(&mut self, ctx: &TickContext<'_>, wheels: WheelValues) -> Step {
        let mut instructions = self.reset_arms(ctx);
        instructions.push(Instruction::SetWheels {
            id: ctx.agent_id,
            wheels,
        });
        Step::running(instructions)
    }
}

fn region_of(remaining: f32) -> [PathRegion; 1] {
    if remaining < 0.0 {
        [PathRegion::Backward]
    } else {
        [PathRegion::Forward]
    }
}

/// Horizontal unit forward axis of `ctx`'s body.
fn heading(ctx: &TickContext<'_>) -> Vec3 {
    ctx.body.rotation.forward().horizontal().normalized()
}

// ────────────────────────────────────────────────────────────────────────────
// TurnBy
// ────────────────────────────────────────────────────────────────────────────

/// Turn in place by a signed angle in degrees; positive turns right.
#[derive(Debug, Clone)]
pub struct TurnBy {
    angle: f32,
    drive: Drive,
    last_yaw: Option<f32>,
    traversed: f32,
}

impl TurnBy {
    pub fn new(angle: f32, params: MoveParams) -> Result<Self, ReplicantError> {
        Ok(Self {
            angle: finite("angle", angle)?,
            drive: Drive::new(params)?,
            last_yaw: None,
            traversed: 0.0,
        })
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Degrees turned so far.
    pub fn traversed(&self) -> f32 {
        self.traversed
    }

    pub(crate) fn sense(&self) -> MotionSense {
        MotionSense::of_angle(self.angle)
    }

    pub(crate) fn update(&mut self, ctx: &TickContext<'_>, hands: &mut Hands) -> Step {
        let yaw = ctx.body.rotation.yaw();
        let first = match self.last_yaw {
            None => true,
            Some(last) => {
                self.traversed += wrap_degrees(yaw - last);
                false
            }
        };
        self.last_yaw = Some(yaw);

        if let Err(reason) = self.drive.check(ctx, hands, first, self.sense(), &[], None) {
            return Step::failure(reason);
        }
        let remaining = self.angle - self.traversed;
        if remaining.abs() <= self.drive.params.aligned_at {
            return Step::success(Vec::new());
        }
        self.drive.turn(ctx, remaining)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TurnTo
// ────────────────────────────────────────────────────────────────────────────

/// Turn in place until facing a target.
#[derive(Debug, Clone)]
pub struct TurnTo {
    target: Target,
    drive: Drive,
    sense: Option<MotionSense>,
}

impl TurnTo {
    pub fn new(target: impl Into<Target>, params: MoveParams) -> Result<Self, ReplicantError> {
        Ok(Self {
            target: target.into(),
            drive: Drive::new(params)?,
            sense: None,
        })
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub(crate) fn sense(&self) -> MotionSense {
        self.sense.unwrap_or(MotionSense::None)
    }

    pub(crate) fn update(&mut self, ctx: &TickContext<'_>, hands: &mut Hands) -> Step {
        let resolved = match TargetResolver::resolve(&self.target, ctx.world) {
            Ok(r) => r,
            Err(reason) => return Step::failure(reason),
        };
        let remaining = bearing_to(&ctx.body.pose(), resolved.position);
        let first = self.sense.is_none();
        let sense = *self.sense.get_or_insert(MotionSense::of_angle(remaining));

        if let Err(reason) = self
            .drive
            .check(ctx, hands, first, sense, &[], resolved.anchor)
        {
            return Step::failure(reason);
        }
        if remaining.abs() <= self.drive.params.aligned_at {
            return Step::success(Vec::new());
        }
        self.drive.turn(ctx, remaining)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MoveBy
// ────────────────────────────────────────────────────────────────────────────

/// Drive a signed distance in metres along the initial forward axis;
/// negative backs up.
#[derive(Debug, Clone)]
pub struct MoveBy {
    distance: f32,
    drive: Drive,
    /// Start position and forward axis, captured on the first tick.
    origin: Option<(Vec3, Vec3)>,
    traversed: f32,
}

impl MoveBy {
    pub fn new(distance: f32, params: MoveParams) -> Result<Self, ReplicantError> {
        Ok(Self {
            distance: finite("distance", distance)?,
            drive: Drive::new(params)?,
            origin: None,
            traversed: 0.0,
        })
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Metres travelled along the initial forward axis so far.
    pub fn traversed(&self) -> f32 {
        self.traversed
    }

    pub(crate) fn sense(&self) -> MotionSense {
        MotionSense::of_distance(self.distance)
    }

    pub(crate) fn update(&mut self, ctx: &TickContext<'_>, hands: &mut Hands) -> Step {
        let first = self.origin.is_none();
        let (start, forward) = *self
            .origin
            .get_or_insert_with(|| (ctx.body.position, heading(ctx)));
        self.traversed = (ctx.body.position - start).dot(forward);
        let remaining = self.distance - self.traversed;

        let regions = region_of(remaining);
        if let Err(reason) = self
            .drive
            .check(ctx, hands, first, self.sense(), &regions, None)
        {
            return Step::failure(reason);
        }
        if remaining.abs() <= self.drive.params.arrived_at {
            return Step::success(Vec::new());
        }
        self.drive.drive(ctx, remaining)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MoveTo
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Start,
    Turn { sense: MotionSense },
    Move { forward: Vec3 },
}

/// Turn to face a target, then drive to it.  The target object itself never
/// counts as a collision.
#[derive(Debug, Clone)]
pub struct MoveTo {
    target: Target,
    drive: Drive,
    phase: Phase,
}

impl MoveTo {
    pub fn new(target: impl Into<Target>, params: MoveParams) -> Result<Self, ReplicantError> {
        Ok(Self {
            target: target.into(),
            drive: Drive::new(params)?,
            phase: Phase::Start,
        })
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// `true` once the turn phase is over.
    pub fn is_moving(&self) -> bool {
        matches!(self.phase, Phase::Move { .. })
    }

    pub(crate) fn sense(&self) -> MotionSense {
        match self.phase {
            Phase::Start => MotionSense::None,
            Phase::Turn { sense } => sense,
            Phase::Move { .. } => MotionSense::Forward,
        }
    }

    fn remaining_distance(&self, ctx: &TickContext<'_>, target: Vec3, forward: Vec3) -> f32 {
        (target - ctx.body.position).horizontal().dot(forward) - self.drive.params.arrived_offset
    }

    pub(crate) fn update(&mut self, ctx: &TickContext<'_>, hands: &mut Hands) -> Step {
        let resolved = match TargetResolver::resolve(&self.target, ctx.world) {
            Ok(r) => r,
            Err(reason) => return Step::failure(reason),
        };
        let pose = ctx.body.pose();
        let bearing = bearing_to(&pose, resolved.position);
        let first = self.phase == Phase::Start;

        if first {
            let close = horizontal_distance(pose.position, resolved.position)
                - self.drive.params.arrived_offset
                <= self.drive.params.arrived_at;
            self.phase = if close || bearing.abs() <= self.drive.params.aligned_at {
                Phase::Move {
                    forward: heading(ctx),
                }
            } else {
                Phase::Turn {
                    sense: MotionSense::of_angle(bearing),
                }
            };
        }

        if let Phase::Turn { sense } = self.phase {
            if let Err(reason) = self
                .drive
                .check(ctx, hands, first, sense, &[], resolved.anchor)
            {
                return Step::failure(reason);
            }
            if bearing.abs() > self.drive.params.aligned_at {
                return self.drive.turn(ctx, bearing);
            }
            debug!(agent = ctx.agent_id, "move_to aligned, driving");
            self.drive.controller.reset();
            self.phase = Phase::Move {
                forward: heading(ctx),
            };
        }

        let Phase::Move { forward } = self.phase else {
            return Step::running(Vec::new());
        };
        let remaining = self.remaining_distance(ctx, resolved.position, forward);
        let regions = region_of(remaining);
        if let Err(reason) = self.drive.check(
            ctx,
            hands,
            first,
            MotionSense::Forward,
            &regions,
            resolved.anchor,
        ) {
            return Step::failure(reason);
        }
        if remaining.abs() <= self.drive.params.arrived_at {
            return Step::success(Vec::new());
        }
        self.drive.drive(ctx, remaining)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::{body_frame, Harness};
    use crate::actions::{Action, ActionKind, Predecessor};
    use replicant_types::{ActionStatus, BodyPart, Collider, Quaternion, ResponseFrame};

    fn set_wheels(step: &Step) -> Option<WheelValues> {
        step.instructions.iter().find_map(|i| match i {
            Instruction::SetWheels { wheels, .. } => Some(*wheels),
            _ => None,
        })
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(MoveBy::new(f32::NAN, MoveParams::default()).is_err());
        let params = MoveParams {
            arrived_at: -1.0,
            ..MoveParams::default()
        };
        assert!(matches!(
            TurnBy::new(10.0, params),
            Err(ReplicantError::InvalidParameter { .. })
        ));
        let params = MoveParams {
            reset_arms_duration: 0.0,
            ..MoveParams::default()
        };
        assert!(MoveBy::new(1.0, params).is_err());
    }

    #[test]
    fn move_by_drives_and_resets_arms_once() {
        let mut h = Harness::new(vec![body_frame(Vec3::zero(), 0.0)]);
        let mut action = Action::new(MoveBy::new(1.0, MoveParams::default()).unwrap());

        let step = h.step(&mut action);
        assert_eq!(step.status, ActionStatus::Ongoing);
        let resets = step
            .instructions
            .iter()
            .filter(|i| matches!(i, Instruction::ResetArm { .. }))
            .count();
        assert_eq!(resets, 2);
        assert!(set_wheels(&step).unwrap().left_motor_torque > 0.0);

        h.set_frames(vec![body_frame(Vec3::new(0.0, 0.0, 0.5), 0.0)]);
        let step = h.step(&mut action);
        assert_eq!(step.instructions.len(), 1);

        h.set_frames(vec![body_frame(Vec3::new(0.0, 0.0, 0.95), 0.0)]);
        let step = h.step(&mut action);
        assert_eq!(step.status, ActionStatus::Success);
        assert_eq!(step.instructions, vec![Instruction::Brake { id: 0 }]);
    }

    #[test]
    fn backward_move_watches_the_backward_region() {
        let mut h = Harness::new(vec![
            body_frame(Vec3::zero(), 0.0),
            ResponseFrame::Obstacle {
                agent_id: 0,
                region: PathRegion::Forward,
                collider: Collider::object(3),
            },
        ]);
        let mut back = Action::new(MoveBy::new(-1.0, MoveParams::default()).unwrap());
        let step = h.step(&mut back);
        assert_eq!(step.status, ActionStatus::Ongoing);
        assert!(set_wheels(&step).unwrap().left_motor_torque < 0.0);

        let mut ahead = Action::new(MoveBy::new(1.0, MoveParams::default()).unwrap());
        let step = h.step(&mut ahead);
        assert_eq!(step.status, ActionStatus::Failure(FailureReason::ObstacleAvoided));
        assert!(step.instructions.is_empty());
    }

    #[test]
    fn collision_wins_over_success_on_the_same_tick() {
        let mut h = Harness::new(vec![body_frame(Vec3::zero(), 0.0)]);
        let mut action = Action::new(MoveBy::new(0.5, MoveParams::default()).unwrap());
        h.step(&mut action);
        h.set_frames(vec![
            body_frame(Vec3::new(0.0, 0.0, 0.5), 0.0),
            ResponseFrame::Contact {
                agent_id: 0,
                part: BodyPart::Base,
                collider: Collider::wall(9000),
            },
        ]);
        let step = h.step(&mut action);
        assert_eq!(step.status, ActionStatus::Failure(FailureReason::WallCollision));
        assert_eq!(step.instructions, vec![Instruction::Brake { id: 0 }]);
    }

    #[test]
    fn carry_over_fails_first_tick_without_motion() {
        let mut h = Harness::new(vec![body_frame(Vec3::zero(), 0.0)]);
        h.previous = Some(Predecessor {
            sense: MotionSense::Forward,
            failure: Some(FailureReason::ObjectCollision),
        });
        let mut action = Action::new(MoveBy::new(1.0, MoveParams::default()).unwrap());
        let step = h.step(&mut action);
        assert_eq!(
            step.status,
            ActionStatus::Failure(FailureReason::PreviousFailureCarryOver)
        );
        assert!(step.instructions.is_empty());

        let mut back = Action::new(MoveBy::new(-1.0, MoveParams::default()).unwrap());
        assert_eq!(h.step(&mut back).status, ActionStatus::Ongoing);
    }

    #[test]
    fn turn_by_accumulates_across_the_wrap() {
        let mut h = Harness::new(vec![body_frame(Vec3::zero(), 170.0)]);
        let mut action = Action::new(TurnBy::new(30.0, MoveParams::default()).unwrap());
        let step = h.step(&mut action);
        let wheels = set_wheels(&step).unwrap();
        assert!(wheels.left_motor_torque > 0.0 && wheels.right_motor_torque < 0.0);

        h.set_frames(vec![body_frame(Vec3::zero(), -170.0)]);
        let step = h.step(&mut action);
        assert_eq!(step.status, ActionStatus::Ongoing);
        if let ActionKind::TurnBy(turn) = action.kind() {
            assert!((turn.traversed() - 20.0).abs() < 1e-3);
        }

        h.set_frames(vec![body_frame(Vec3::zero(), -160.5)]);
        assert_eq!(h.step(&mut action).status, ActionStatus::Success);
    }

    #[test]
    fn turn_to_uses_bearing_and_explicit_wheels() {
        let wheels = WheelValues {
            left_motor_torque: 1.0,
            right_motor_torque: -1.0,
            ..WheelValues::default()
        };
        let params = MoveParams {
            wheel_values: Some(wheels),
            reset_arms: false,
            ..MoveParams::default()
        };
        let mut h = Harness::new(vec![body_frame(Vec3::zero(), 0.0)]);
        let mut action = Action::new(TurnTo::new(Vec3::new(1.0, 0.0, 0.0), params).unwrap());
        let step = h.step(&mut action);
        assert_eq!(step.instructions, vec![Instruction::SetWheels { id: 0, wheels }]);
        assert_eq!(action.sense(), MotionSense::TurnRight);

        h.set_frames(vec![body_frame(Vec3::zero(), 89.5)]);
        assert_eq!(h.step(&mut action).status, ActionStatus::Success);
    }

    #[test]
    fn turn_to_missing_object_fails() {
        let mut h = Harness::new(vec![body_frame(Vec3::zero(), 0.0)]);
        let mut action = Action::new(TurnTo::new(42u32, MoveParams::default()).unwrap());
        assert_eq!(
            h.step(&mut action).status,
            ActionStatus::Failure(FailureReason::UnknownObject(42))
        );
    }

    #[test]
    fn move_to_turns_then_drives_ignoring_its_target() {
        let mug = ResponseFrame::Transform {
            id: 7,
            position: Vec3::new(2.0, 0.0, 0.0),
            rotation: Quaternion::identity(),
        };
        let touching_mug = ResponseFrame::Contact {
            agent_id: 0,
            part: BodyPart::Base,
            collider: Collider::object(7),
        };
        let mut h = Harness::new(vec![body_frame(Vec3::zero(), 0.0), mug.clone()]);
        let mut action = Action::new(MoveTo::new(7u32, MoveParams::default()).unwrap());

        let step = h.step(&mut action);
        assert_eq!(action.sense(), MotionSense::TurnRight);
        assert!(set_wheels(&step).unwrap().right_motor_torque < 0.0);

        h.set_frames(vec![body_frame(Vec3::zero(), 90.0), mug.clone()]);
        let step = h.step(&mut action);
        assert_eq!(action.sense(), MotionSense::Forward);
        let wheels = set_wheels(&step).unwrap();
        assert_eq!(wheels.left_motor_torque, wheels.right_motor_torque);

        h.set_frames(vec![body_frame(Vec3::new(1.95, 0.0, 0.0), 90.0), mug, touching_mug]);
        assert_eq!(h.step(&mut action).status, ActionStatus::Success);
    }

    #[test]
    fn params_parse_from_partial_toml() {
        let params: MoveParams = toml::from_str(
            r#"
            arrived_offset = 0.5
            reset_arms = false
            "#,
        )
        .unwrap();
        assert_eq!(params.arrived_offset, 0.5);
        assert!(!params.reset_arms);
        assert_eq!(params.arrived_at, MoveParams::default().arrived_at);
        assert!(params.wheel_values.is_none());
    }
}
