//! Replicant actions.
//!
//! An [`Action`] is one high-level behavior spanning 1..N ticks.  Every tick
//! the scheduler calls [`Action::update`] with the latest world snapshot;
//! the action decides whether it continues, succeeds or fails and returns
//! the instructions to send on the next round-trip.
//!
//! Behaviors are a closed set, one payload struct per [`ActionKind`]
//! variant, all following the same `update(ctx, hands) -> Step` contract:
//!
//! | Module | Variants |
//! |---|---|
//! | [`locomotion`] | `TurnBy`, `TurnTo`, `MoveBy`, `MoveTo` |
//! | [`arm`] | `ReachFor`, `ResetArm` |
//! | [`interaction`] | `Grasp`, `Drop` |
//! | [`head`] | `LookAt`, `RotateHead`, `ResetHead` |

pub mod arm;
pub mod head;
pub mod interaction;
pub mod locomotion;

use std::collections::{BTreeMap, BTreeSet};

use replicant_kernel::{CollisionEvaluator, CollisionPolicy};
use replicant_perception::world::{BodyState, WorldState};
use replicant_types::{ActionStatus, Arm, Axis, FailureReason, Instruction, ObjectId};
use tracing::{debug, info};

pub use arm::{ArmTarget, ReachFor, ReachParams};
pub use head::{HeadParams, LookAt, ResetHead, RotateHead};
pub use interaction::{Drop, Grasp};
pub use locomotion::{MoveBy, MoveParams, MoveTo, TurnBy, TurnTo};

// ────────────────────────────────────────────────────────────────────────────
// Held objects
// ────────────────────────────────────────────────────────────────────────────

/// A standing rotation pin on a held object, re-applied every tick until
/// the object is dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attachment {
    pub arm: Arm,
    pub axis: Axis,
    /// Degrees around `axis`.
    pub angle: f32,
    pub relative_to_hand: bool,
}

/// What the replicant's hands are holding.  A hand holds at most one
/// object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hands {
    held: BTreeMap<Arm, ObjectId>,
    attachments: BTreeMap<ObjectId, Attachment>,
}

impl Hands {
    pub fn held(&self, arm: Arm) -> Option<ObjectId> {
        self.held.get(&arm).copied()
    }

    /// The hand holding `object`, if any.
    pub fn holding(&self, object: ObjectId) -> Option<Arm> {
        self.held
            .iter()
            .find_map(|(arm, id)| (*id == object).then_some(*arm))
    }

    pub fn held_ids(&self) -> BTreeSet<ObjectId> {
        self.held.values().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub(crate) fn grasp(&mut self, arm: Arm, object: ObjectId) {
        self.held.insert(arm, object);
    }

    /// Empty `arm`, removing any pin on the object it held.
    pub(crate) fn release(&mut self, arm: Arm) -> Option<ObjectId> {
        let object = self.held.remove(&arm)?;
        self.attachments.remove(&object);
        Some(object)
    }

    pub(crate) fn attach(&mut self, object: ObjectId, attachment: Attachment) {
        self.attachments.insert(object, attachment);
    }

    pub fn attachment(&self, object: ObjectId) -> Option<&Attachment> {
        self.attachments.get(&object)
    }

    /// One pin instruction per attachment.
    pub fn pin_instructions(&self, agent_id: ObjectId) -> Vec<Instruction> {
        self.attachments
            .iter()
            .map(|(object_id, a)| Instruction::PinHeldRotation {
                id: agent_id,
                object_id: *object_id,
                arm: a.arm,
                axis: a.axis,
                angle: a.angle,
                relative_to_hand: a.relative_to_hand,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.held.clear();
        self.attachments.clear();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tick context
// ────────────────────────────────────────────────────────────────────────────

/// Directional sense of a motion, compared between consecutive actions for
/// failure carry-over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionSense {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    Arm,
    None,
}

impl MotionSense {
    pub fn of_distance(distance: f32) -> Self {
        if distance < 0.0 {
            MotionSense::Backward
        } else {
            MotionSense::Forward
        }
    }

    pub fn of_angle(angle: f32) -> Self {
        if angle < 0.0 {
            MotionSense::TurnLeft
        } else {
            MotionSense::TurnRight
        }
    }
}

/// How the previous action on the same agent ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predecessor {
    pub sense: MotionSense,
    /// `None` when it succeeded or was cancelled.
    pub failure: Option<FailureReason>,
}

/// Everything an action may read on one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    pub agent_id: ObjectId,
    pub world: &'a WorldState,
    /// The agent's own body this tick.
    pub body: &'a BodyState,
    pub policy: &'a CollisionPolicy,
    pub evaluator: &'a CollisionEvaluator,
    pub previous: Option<Predecessor>,
    /// Framerate the simulator last reported.
    pub tick_rate: f32,
}

impl TickContext<'_> {
    /// `true` when the predecessor failed on a collision while moving in
    /// `sense`.
    pub fn previous_same_failed(&self, sense: MotionSense) -> bool {
        sense != MotionSense::None
            && self
                .previous
                .is_some_and(|p| p.sense == sense && p.failure.is_some_and(FailureReason::is_collision))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Step
// ────────────────────────────────────────────────────────────────────────────

/// Result of advancing an action by one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub status: ActionStatus,
    pub instructions: Vec<Instruction>,
}

impl Step {
    pub fn running(instructions: Vec<Instruction>) -> Self {
        Self {
            status: ActionStatus::Ongoing,
            instructions,
        }
    }

    pub fn success(instructions: Vec<Instruction>) -> Self {
        Self {
            status: ActionStatus::Success,
            instructions,
        }
    }

    pub fn failure(reason: FailureReason) -> Self {
        Self {
            status: ActionStatus::Failure(reason),
            instructions: Vec::new(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Action
// ────────────────────────────────────────────────────────────────────────────

/// The closed set of replicant behaviors.
#[derive(Debug, Clone)]
pub enum ActionKind {
    TurnBy(TurnBy),
    TurnTo(TurnTo),
    MoveBy(MoveBy),
    MoveTo(MoveTo),
    ReachFor(ReachFor),
    ResetArm(ReachFor),
    Grasp(Grasp),
    Drop(Drop),
    LookAt(LookAt),
    RotateHead(RotateHead),
    ResetHead(ResetHead),
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::TurnBy(_) => "turn_by",
            ActionKind::TurnTo(_) => "turn_to",
            ActionKind::MoveBy(_) => "move_by",
            ActionKind::MoveTo(_) => "move_to",
            ActionKind::ReachFor(_) => "reach_for",
            ActionKind::ResetArm(_) => "reset_arm",
            ActionKind::Grasp(_) => "grasp",
            ActionKind::Drop(_) => "drop",
            ActionKind::LookAt(_) => "look_at",
            ActionKind::RotateHead(_) => "rotate_head",
            ActionKind::ResetHead(_) => "reset_head",
        }
    }

    /// Current directional sense.
    pub fn sense(&self) -> MotionSense {
        match self {
            ActionKind::TurnBy(a) => a.sense(),
            ActionKind::TurnTo(a) => a.sense(),
            ActionKind::MoveBy(a) => a.sense(),
            ActionKind::MoveTo(a) => a.sense(),
            ActionKind::ReachFor(_) | ActionKind::ResetArm(_) => MotionSense::Arm,
            _ => MotionSense::None,
        }
    }

    fn update(&mut self, ctx: &TickContext<'_>, hands: &mut Hands) -> Step {
        match self {
            ActionKind::TurnBy(a) => a.update(ctx, hands),
            ActionKind::TurnTo(a) => a.update(ctx, hands),
            ActionKind::MoveBy(a) => a.update(ctx, hands),
            ActionKind::MoveTo(a) => a.update(ctx, hands),
            ActionKind::ReachFor(a) | ActionKind::ResetArm(a) => a.update(ctx, hands),
            ActionKind::Grasp(a) => a.update(ctx, hands),
            ActionKind::Drop(a) => a.update(ctx, hands),
            ActionKind::LookAt(a) => a.update(ctx, hands),
            ActionKind::RotateHead(a) => a.update(ctx, hands),
            ActionKind::ResetHead(a) => a.update(ctx, hands),
        }
    }

    /// Instructions that halt whatever this action set in motion.
    fn end_instructions(&self, agent_id: ObjectId) -> Vec<Instruction> {
        match self {
            ActionKind::TurnBy(_)
            | ActionKind::TurnTo(_)
            | ActionKind::MoveBy(_)
            | ActionKind::MoveTo(_) => vec![Instruction::Brake { id: agent_id }],
            ActionKind::ReachFor(a) | ActionKind::ResetArm(a) => a
                .moving_arms()
                .into_iter()
                .map(|arm| Instruction::StopArm { id: agent_id, arm })
                .collect(),
            _ => Vec::new(),
        }
    }
}

macro_rules! impl_from_kind {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for ActionKind {
                fn from(action: $variant) -> Self {
                    ActionKind::$variant(action)
                }
            }
        )*
    };
}

impl_from_kind!(TurnBy, TurnTo, MoveBy, MoveTo, ReachFor, Grasp, Drop, LookAt, RotateHead, ResetHead);

/// An [`ActionKind`] plus its lifecycle.  Once terminal, its status never
/// changes and [`Action::update`] is a no-op.
#[derive(Debug, Clone)]
pub struct Action {
    kind: ActionKind,
    status: ActionStatus,
    started_motion: bool,
    ticks: u32,
}

impl Action {
    pub fn new(kind: impl Into<ActionKind>) -> Self {
        Self {
            kind: kind.into(),
            status: ActionStatus::Ongoing,
            started_motion: false,
            ticks: 0,
        }
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn status(&self) -> ActionStatus {
        self.status
    }

    pub fn sense(&self) -> MotionSense {
        self.kind.sense()
    }

    /// Number of ticks this action has been advanced.
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// `true` once any motion instruction was emitted.
    pub fn started_motion(&self) -> bool {
        self.started_motion
    }

    /// Advance by one tick.  On termination after motion began, the
    /// kind's end instructions not already in this tick's batch are
    /// appended.
    pub fn update(&mut self, ctx: &TickContext<'_>, hands: &mut Hands) -> Step {
        if self.status.is_terminal() {
            return Step {
                status: self.status,
                instructions: Vec::new(),
            };
        }

        self.ticks += 1;
        let mut step = self.kind.update(ctx, hands);
        if step.instructions.iter().any(Instruction::is_motion) {
            self.started_motion = true;
        }
        self.status = step.status;

        match step.status {
            ActionStatus::Ongoing => {
                debug!(action = self.name(), tick = self.ticks, "action running");
            }
            status => {
                info!(action = self.name(), ticks = self.ticks, %status, "action finished");
                if self.started_motion {
                    for halt in self.kind.end_instructions(ctx.agent_id) {
                        if !step.instructions.contains(&halt) {
                            step.instructions.push(halt);
                        }
                    }
                }
            }
        }
        step
    }

    /// End instructions if this action is abandoned mid-motion.
    pub(crate) fn cancel_instructions(&self, agent_id: ObjectId) -> Vec<Instruction> {
        if self.started_motion && !self.status.is_terminal() {
            self.kind.end_instructions(agent_id)
        } else {
            Vec::new()
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Test support
// ────────────────────────────────────────────────────────────────────────────
