//! Arm articulation: [`ReachFor`] and its neutral-pose special case, the
//! reset-arm action.
//!
//! Each reaching hand runs its own sub-state: it is sent an interpolated
//! target every frame of its [`MotionProfile`], and one tick after the last
//! frame its reported position is compared against the goal.  The action
//! ends once every hand has ended and fails with the first hand failure.

use std::collections::BTreeSet;

use replicant_kernel::collision::CollisionCheck;
use replicant_kernel::motion::{validate_threshold, MotionProfile, REFERENCE_TICK_RATE};
use replicant_kernel::Easing;
use replicant_perception::TargetResolver;
use replicant_types::{
    neutral_hand_offset, ActionStatus, Arm, BodyPart, FailureReason, Instruction, ObjectId,
    PathRegion, ReplicantError, Target, Vec3,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Hands, MotionSense, Step, TickContext};

/// Options for [`ReachFor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReachParams {
    /// Position targets are world-space; otherwise offsets in the agent's
    /// frame.
    pub absolute: bool,
    /// The other hand tracks the primary hand at its initial separation.
    /// Requires exactly one target.
    pub offhand_follows: bool,
    /// Success tolerance in metres.
    pub arrived_at: f32,
    /// Targets further than this from the hand fail without moving.
    pub max_distance: f32,
    pub duration: f32,
    pub scale_duration: bool,
    pub easing: Easing,
}

impl Default for ReachParams {
    fn default() -> Self {
        Self {
            absolute: true,
            offhand_follows: false,
            arrived_at: 0.09,
            max_distance: 1.5,
            duration: 0.25,
            scale_duration: true,
            easing: Easing::default(),
        }
    }
}

/// One hand and what it reaches for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmTarget {
    pub arm: Arm,
    pub target: Target,
}

impl<T: Into<Target>> From<(Arm, T)> for ArmTarget {
    fn from((arm, target): (Arm, T)) -> Self {
        Self {
            arm,
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct HandReach {
    arm: Arm,
    target: Target,
    start: Vec3,
    goal: Vec3,
    anchor: Option<ObjectId>,
    status: ActionStatus,
}

#[derive(Debug, Clone, Copy)]
struct Follower {
    arm: Arm,
    offset: Vec3,
}

/// Move one or both hands to targets.
#[derive(Debug, Clone)]
pub struct ReachFor {
    targets: Vec<ArmTarget>,
    params: ReachParams,
    profile: MotionProfile,
    reaches: Vec<HandReach>,
    follower: Option<Follower>,
    frame: u32,
}

impl ReachFor {
    /// Fails with [`ReplicantError::EmptyTargets`] when `targets` is empty
    /// and [`ReplicantError::InvalidParameter`] for a repeated arm, a bad
    /// threshold or duration, or `offhand_follows` with two targets.
    pub fn new<I, T>(targets: I, params: ReachParams) -> Result<Self, ReplicantError>
    where
        I: IntoIterator<Item = T>,
        T: Into<ArmTarget>,
    {
        let targets: Vec<ArmTarget> = targets.into_iter().map(Into::into).collect();
        if targets.is_empty() {
            return Err(ReplicantError::EmptyTargets);
        }
        let arms: BTreeSet<Arm> = targets.iter().map(|t| t.arm).collect();
        if arms.len() != targets.len() {
            return Err(ReplicantError::invalid("targets", "each arm may appear once"));
        }
        if params.offhand_follows && targets.len() != 1 {
            return Err(ReplicantError::invalid(
                "offhand_follows",
                "requires exactly one target",
            ));
        }
        validate_threshold("arrived_at", params.arrived_at)?;
        validate_threshold("max_distance", params.max_distance)?;
        Self::build(targets, params)
    }

    /// Return `arms` to their neutral offsets, with no distance limit.
    pub fn reset(arms: &[Arm], duration: f32, scale_duration: bool) -> Result<Self, ReplicantError> {
        let targets: Vec<ArmTarget> = arms
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|arm| ArmTarget {
                arm: *arm,
                target: Target::Position(neutral_hand_offset(*arm)),
            })
            .collect();
        if targets.is_empty() {
            return Err(ReplicantError::EmptyTargets);
        }
        let params = ReachParams {
            absolute: false,
            max_distance: f32::INFINITY,
            duration,
            scale_duration,
            ..ReachParams::default()
        };
        Self::build(targets, params)
    }

    fn build(targets: Vec<ArmTarget>, params: ReachParams) -> Result<Self, ReplicantError> {
        let profile = MotionProfile::new(
            params.duration,
            params.scale_duration,
            REFERENCE_TICK_RATE,
            params.easing,
        )?;
        Ok(Self {
            targets,
            params,
            profile,
            reaches: Vec::new(),
            follower: None,
            frame: 0,
        })
    }

    pub fn targets(&self) -> &[ArmTarget] {
        &self.targets
    }

    pub fn params(&self) -> &ReachParams {
        &self.params
    }

    /// Arms this action commands, the follower included.
    pub fn moving_arms(&self) -> Vec<Arm> {
        let mut arms: Vec<Arm> = self.targets.iter().map(|t| t.arm).collect();
        if self.params.offhand_follows {
            arms.extend(self.targets.first().map(|t| t.arm.other()));
        }
        arms
    }

    fn check(
        &self,
        ctx: &TickContext<'_>,
        hands: &Hands,
        arm: Arm,
        first: bool,
    ) -> Result<(), FailureReason> {
        let mut ignored = hands.held_ids();
        ignored.extend(self.reaches.iter().filter_map(|r| r.anchor));
        let regions = [PathRegion::Arm(arm)];
        let parts = [BodyPart::Arm(arm)];
        let check = CollisionCheck {
            previous_same_failed: first && ctx.previous_same_failed(MotionSense::Arm),
            regions: &regions,
            parts: Some(&parts),
            obstacles: ctx.world.obstacles(ctx.agent_id),
            contacts: ctx.world.contacts(ctx.agent_id),
            ignored: &ignored,
        };
        ctx.evaluator.evaluate(ctx.policy, &check)
    }

    /// Resolve every target against the first tick's world.
    fn begin(&mut self, ctx: &TickContext<'_>) -> Result<(), FailureReason> {
        if let Ok(profile) = MotionProfile::new(
            self.params.duration,
            self.params.scale_duration,
            ctx.tick_rate,
            self.params.easing,
        ) {
            self.profile = profile;
        }
        let pose = ctx.body.pose();
        for t in &self.targets {
            let start = ctx.body.hand(t.arm);
            let resolved = TargetResolver::resolve_reach(
                &t.target,
                ctx.world,
                &pose,
                start,
                self.params.absolute,
            )?;
            self.reaches.push(HandReach {
                arm: t.arm,
                target: t.target,
                start,
                goal: resolved.position,
                anchor: resolved.anchor,
                status: ActionStatus::Ongoing,
            });
        }
        if self.params.offhand_follows {
            if let Some(primary) = self.targets.first().map(|t| t.arm) {
                let arm = primary.other();
                self.follower = Some(Follower {
                    arm,
                    offset: ctx.body.hand(arm) - ctx.body.hand(primary),
                });
            }
        }
        debug!(
            agent = ctx.agent_id,
            hands = self.reaches.len(),
            frames = self.profile.num_frames(),
            "reach resolved"
        );
        Ok(())
    }

    pub(crate) fn update(&mut self, ctx: &TickContext<'_>, hands: &mut Hands) -> Step {
        let first = self.reaches.is_empty();
        if first {
            if let Err(reason) = self.begin(ctx) {
                return Step::failure(reason);
            }
            for reach in &self.reaches {
                if let Err(reason) = self.check(ctx, hands, reach.arm, true) {
                    return Step::failure(reason);
                }
            }
            for reach in &self.reaches {
                if reach.start.distance(reach.goal) > self.params.max_distance {
                    return Step::failure(FailureReason::TargetTooFar);
                }
            }
        }

        self.frame += 1;
        let frame = self.frame;
        let pose = ctx.body.pose();
        let mut instructions = Vec::new();
        let mut primary_command = None;

        for i in 0..self.reaches.len() {
            if self.reaches[i].status.is_terminal() {
                continue;
            }
            let arm = self.reaches[i].arm;

            if let Some(id) = self.reaches[i].anchor {
                let hand = ctx.body.hand(arm);
                match TargetResolver::resolve_reach(
                    &self.reaches[i].target,
                    ctx.world,
                    &pose,
                    hand,
                    self.params.absolute,
                ) {
                    Ok(resolved) => self.reaches[i].goal = resolved.position,
                    Err(_) => {
                        self.reaches[i].status =
                            ActionStatus::Failure(FailureReason::UnknownObject(id));
                        instructions.push(Instruction::StopArm {
                            id: ctx.agent_id,
                            arm,
                        });
                        continue;
                    }
                }
            }

            if !first {
                if let Err(reason) = self.check(ctx, hands, arm, false) {
                    self.reaches[i].status = ActionStatus::Failure(reason);
                    instructions.push(Instruction::StopArm {
                        id: ctx.agent_id,
                        arm,
                    });
                    continue;
                }
            }

            let reach = &mut self.reaches[i];
            if frame <= self.profile.num_frames() {
                let position = reach.start.lerp(reach.goal, self.profile.progress(frame));
                if i == 0 {
                    primary_command = Some(position);
                }
                instructions.push(Instruction::SetHandTarget {
                    id: ctx.agent_id,
                    arm,
                    position,
                });
            } else {
                let miss = ctx.body.hand(arm).distance(reach.goal);
                reach.status = if miss <= self.params.arrived_at {
                    ActionStatus::Success
                } else {
                    debug!(agent = ctx.agent_id, %arm, miss, "hand short of target");
                    ActionStatus::Failure(FailureReason::NotArrived)
                };
            }
        }

        if let (Some(follower), Some(position)) = (self.follower, primary_command) {
            instructions.push(Instruction::SetHandTarget {
                id: ctx.agent_id,
                arm: follower.arm,
                position: position + follower.offset,
            });
        }

        if self.reaches.iter().any(|r| !r.status.is_terminal()) {
            return Step::running(instructions);
        }
        match self.reaches.iter().find_map(|r| r.status.failure()) {
            Some(reason) => Step {
                status: ActionStatus::Failure(reason),
                instructions,
            },
            None => Step::success(instructions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::{body_frame, Harness};
    use crate::actions::{Action, Predecessor};
    use replicant_types::{Collider, Quaternion, ResponseFrame};

    fn commanded(step: &Step, arm: Arm) -> Option<Vec3> {
        step.instructions.iter().find_map(|i| match i {
            Instruction::SetHandTarget { arm: a, position, .. } if *a == arm => Some(*position),
            _ => None,
        })
    }

    /// Body frame with the right hand placed at `hand`.
    fn with_right_hand(hand: Vec3) -> ResponseFrame {
        match body_frame(Vec3::zero(), 0.0) {
            ResponseFrame::Replicant {
                id,
                position,
                rotation,
                left_hand,
                head_rotation,
                ..
            } => ResponseFrame::Replicant {
                id,
                position,
                rotation,
                left_hand,
                right_hand: hand,
                head_rotation,
            },
            other => other,
        }
    }

    /// Exactly one frame at 60 Hz.
    const ONE_FRAME: f32 = 0.015625;

    fn linear(duration: f32) -> ReachParams {
        ReachParams {
            duration,
            scale_duration: false,
            easing: Easing::Linear,
            ..ReachParams::default()
        }
    }

    #[test]
    fn construction_is_validated() {
        let none: Vec<ArmTarget> = Vec::new();
        assert_eq!(
            ReachFor::new(none, ReachParams::default()).unwrap_err(),
            ReplicantError::EmptyTargets
        );
        let twice = [(Arm::Left, Vec3::zero()), (Arm::Left, Vec3::zero())];
        assert!(ReachFor::new(twice, ReachParams::default()).is_err());
        let both = [(Arm::Left, Vec3::zero()), (Arm::Right, Vec3::zero())];
        let follow = ReachParams {
            offhand_follows: true,
            ..ReachParams::default()
        };
        assert!(ReachFor::new(both, follow).is_err());
        assert!(ReachFor::new([(Arm::Left, Vec3::zero())], linear(0.0)).is_err());
    }

    #[test]
    fn too_far_fails_first_tick_without_motion() {
        let mut h = Harness::new(vec![body_frame(Vec3::zero(), 0.0)]);
        let mut action =
            Action::new(ReachFor::new([(Arm::Right, Vec3::new(0.0, 1.0, 3.0))], ReachParams::default()).unwrap());
        let step = h.step(&mut action);
        assert_eq!(step.status, ActionStatus::Failure(FailureReason::TargetTooFar));
        assert!(step.instructions.is_empty());
        assert!(!action.started_motion());
    }

    #[test]
    fn reach_interpolates_then_checks_arrival() {
        let start = Vec3::new(0.2, 0.95, 0.1);
        let goal = Vec3::new(0.2, 0.95, 0.4);
        let mut h = Harness::new(vec![with_right_hand(start)]);
        // 1/16 s at 60 Hz: four frames.
        let mut action = Action::new(ReachFor::new([(Arm::Right, goal)], linear(0.0625)).unwrap());

        let first = commanded(&h.step(&mut action), Arm::Right).unwrap();
        assert!((first.z - 0.175).abs() < 1e-4);
        h.step(&mut action);
        h.step(&mut action);
        let last = commanded(&h.step(&mut action), Arm::Right).unwrap();
        assert!(last.distance(goal) < 1e-4);

        h.set_frames(vec![with_right_hand(Vec3::new(0.2, 0.95, 0.35))]);
        let step = h.step(&mut action);
        assert_eq!(step.status, ActionStatus::Success);
        assert_eq!(
            step.instructions,
            vec![Instruction::StopArm { id: 0, arm: Arm::Right }]
        );
    }

    #[test]
    fn hand_short_of_goal_is_not_arrived() {
        let start = Vec3::new(0.2, 0.95, 0.1);
        let mut h = Harness::new(vec![with_right_hand(start)]);
        let goal = Vec3::new(0.2, 0.95, 0.6);
        let mut action = Action::new(ReachFor::new([(Arm::Right, goal)], linear(ONE_FRAME)).unwrap());
        h.step(&mut action);
        assert_eq!(
            h.step(&mut action).status,
            ActionStatus::Failure(FailureReason::NotArrived)
        );
    }

    fn hands_at(left: Vec3, right: Vec3) -> ResponseFrame {
        ResponseFrame::Replicant {
            id: 0,
            position: Vec3::zero(),
            rotation: Quaternion::identity(),
            left_hand: left,
            right_hand: right,
            head_rotation: Quaternion::identity(),
        }
    }

    fn right_arm_touching(object: ObjectId) -> ResponseFrame {
        ResponseFrame::Contact {
            agent_id: 0,
            part: BodyPart::Arm(Arm::Right),
            collider: Collider::object(object),
        }
    }

    #[test]
    fn two_hands_wait_for_each_other_and_report_the_miss() {
        let left_goal = Vec3::new(-0.2, 0.95, 0.3);
        let right_goal = Vec3::new(0.2, 0.95, 0.6);
        let mut h = Harness::new(vec![body_frame(Vec3::zero(), 0.0)]);
        let mut action = Action::new(
            ReachFor::new([(Arm::Left, left_goal), (Arm::Right, right_goal)], linear(ONE_FRAME))
                .unwrap(),
        );
        assert_eq!(h.step(&mut action).status, ActionStatus::Ongoing);

        // Left arrives, right stays 0.5 m short.
        h.set_frames(vec![hands_at(left_goal, neutral_hand_offset(Arm::Right))]);
        assert_eq!(
            h.step(&mut action).status,
            ActionStatus::Failure(FailureReason::NotArrived)
        );
    }

    #[test]
    fn failed_hand_waits_for_the_other_before_the_action_ends() {
        let left_goal = Vec3::new(-0.2, 0.95, 0.3);
        let mut h = Harness::new(vec![body_frame(Vec3::zero(), 0.0)]);
        // Four frames per hand.
        let mut action = Action::new(
            ReachFor::new(
                [(Arm::Left, left_goal), (Arm::Right, Vec3::new(0.2, 0.95, 0.3))],
                linear(0.0625),
            )
            .unwrap(),
        );
        assert_eq!(h.step(&mut action).status, ActionStatus::Ongoing);

        h.set_frames(vec![body_frame(Vec3::zero(), 0.0), right_arm_touching(8)]);
        let step = h.step(&mut action);
        assert_eq!(step.status, ActionStatus::Ongoing);
        assert!(step.instructions.contains(&Instruction::StopArm { id: 0, arm: Arm::Right }));
        assert!(commanded(&step, Arm::Left).is_some());
        assert!(commanded(&step, Arm::Right).is_none());

        h.set_frames(vec![body_frame(Vec3::zero(), 0.0)]);
        assert_eq!(h.step(&mut action).status, ActionStatus::Ongoing);
        assert_eq!(h.step(&mut action).status, ActionStatus::Ongoing);

        h.set_frames(vec![hands_at(left_goal, neutral_hand_offset(Arm::Right))]);
        let step = h.step(&mut action);
        assert_eq!(
            step.status,
            ActionStatus::Failure(FailureReason::ObjectCollision)
        );
        assert!(step.instructions.contains(&Instruction::StopArm { id: 0, arm: Arm::Left }));
    }

    #[test]
    fn arm_collision_stops_the_arm_once() {
        let mut h = Harness::new(vec![body_frame(Vec3::zero(), 0.0)]);
        let mut action = Action::new(
            ReachFor::new([(Arm::Right, Vec3::new(0.2, 0.95, 0.3))], linear(0.0625)).unwrap(),
        );
        assert_eq!(h.step(&mut action).status, ActionStatus::Ongoing);

        h.set_frames(vec![body_frame(Vec3::zero(), 0.0), right_arm_touching(8)]);
        let step = h.step(&mut action);
        assert_eq!(
            step.status,
            ActionStatus::Failure(FailureReason::ObjectCollision)
        );
        assert_eq!(
            step.instructions,
            vec![Instruction::StopArm { id: 0, arm: Arm::Right }]
        );
    }

    #[test]
    fn object_target_uses_nearest_affordance_and_ignores_the_object() {
        let mut h = Harness::new(vec![
            with_right_hand(Vec3::new(0.2, 0.95, 0.1)),
            ResponseFrame::Transform {
                id: 3,
                position: Vec3::new(0.2, 0.8, 0.5),
                rotation: Quaternion::identity(),
            },
            ResponseFrame::Affordances {
                id: 3,
                points: vec![Vec3::new(0.2, 0.95, 0.4), Vec3::new(0.2, 0.95, 0.6)],
            },
            ResponseFrame::Contact {
                agent_id: 0,
                part: BodyPart::Arm(Arm::Right),
                collider: Collider::object(3),
            },
        ]);
        let mut action = Action::new(ReachFor::new([(Arm::Right, 3u32)], linear(ONE_FRAME)).unwrap());
        let target = commanded(&h.step(&mut action), Arm::Right).unwrap();
        assert!(target.distance(Vec3::new(0.2, 0.95, 0.4)) < 1e-4);
        assert_eq!(
            h.step(&mut action).status,
            ActionStatus::Failure(FailureReason::NotArrived)
        );
    }

    #[test]
    fn contacts_on_the_other_arm_are_ignored() {
        let mut h = Harness::new(vec![
            with_right_hand(Vec3::new(0.2, 0.95, 0.1)),
            ResponseFrame::Contact {
                agent_id: 0,
                part: BodyPart::Arm(Arm::Left),
                collider: Collider::object(8),
            },
        ]);
        let mut action = Action::new(
            ReachFor::new([(Arm::Right, Vec3::new(0.2, 0.95, 0.2))], ReachParams::default()).unwrap(),
        );
        assert_eq!(h.step(&mut action).status, ActionStatus::Ongoing);
        assert_eq!(h.step(&mut action).status, ActionStatus::Ongoing);
    }

    #[test]
    fn arm_carry_over() {
        let mut h = Harness::new(vec![body_frame(Vec3::zero(), 0.0)]);
        h.previous = Some(Predecessor {
            sense: MotionSense::Arm,
            failure: Some(FailureReason::ObjectCollision),
        });
        let mut action = Action::new(ReachFor::reset(&[Arm::Left], 0.25, true).unwrap());
        assert_eq!(
            h.step(&mut action).status,
            ActionStatus::Failure(FailureReason::PreviousFailureCarryOver)
        );
    }

    #[test]
    fn offhand_follows_primary_command() {
        let mut h = Harness::new(vec![body_frame(Vec3::zero(), 0.0)]);
        let params = ReachParams {
            offhand_follows: true,
            ..linear(ONE_FRAME)
        };
        let goal = Vec3::new(0.2, 1.2, 0.3);
        let mut action = Action::new(ReachFor::new([(Arm::Right, goal)], params).unwrap());
        assert_eq!(action.kind().sense(), MotionSense::Arm);
        let step = h.step(&mut action);
        let left = commanded(&step, Arm::Left).unwrap();
        // Neutral hands are 0.4 m apart along x.
        assert!(left.distance(Vec3::new(-0.2, 1.2, 0.3)) < 1e-4);
    }

    #[test]
    fn reset_targets_neutral_offsets_in_agent_frame() {
        let mut h = Harness::new(vec![with_right_hand(Vec3::new(0.2, 1.3, 0.5))]);
        let mut action = Action::new(ReachFor::reset(&[Arm::Right], ONE_FRAME, false).unwrap());
        let target = commanded(&h.step(&mut action), Arm::Right).unwrap();
        assert!(target.distance(neutral_hand_offset(Arm::Right)) < 1e-4);
    }
}
