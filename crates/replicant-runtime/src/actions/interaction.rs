//! Object interaction: [`Grasp`] and [`Drop`].
//!
//! Neither action moves the body.  Grasp decides in a single tick; Drop
//! releases on its first tick and then waits for the object to settle.

use replicant_types::{
    Arm, Axis, DropOffset, FailureReason, Instruction, ObjectId, ReplicantError, Vec3,
};
use tracing::debug;

use super::{Attachment, Hands, Step, TickContext};

/// Frame budget for a dropped object to come to rest.
pub const DEFAULT_DROP_FRAMES: u32 = 100;

/// Speed in m/s below which a dropped object counts as settled.
const SETTLED_SPEED: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Pin {
    axis: Axis,
    angle: f32,
    relative_to_hand: bool,
}

/// Pick up an object with one hand.
#[derive(Debug, Clone)]
pub struct Grasp {
    target: ObjectId,
    arm: Arm,
    offset: f32,
    pin: Option<Pin>,
}

impl Grasp {
    pub fn new(target: ObjectId, arm: Arm) -> Self {
        Self {
            target,
            arm,
            offset: 0.0,
            pin: None,
        }
    }

    /// Hold the object at `angle` degrees around `axis` every tick until
    /// it is dropped.
    pub fn with_pin(
        mut self,
        axis: Axis,
        angle: f32,
        relative_to_hand: bool,
    ) -> Result<Self, ReplicantError> {
        if !angle.is_finite() {
            return Err(ReplicantError::invalid("angle", "must be finite"));
        }
        self.pin = Some(Pin {
            axis,
            angle,
            relative_to_hand,
        });
        Ok(self)
    }

    /// Distance in metres the object is held in front of the hand.
    pub fn with_offset(mut self, offset: f32) -> Result<Self, ReplicantError> {
        if !offset.is_finite() {
            return Err(ReplicantError::invalid("offset", "must be finite"));
        }
        self.offset = offset;
        Ok(self)
    }

    pub fn target(&self) -> ObjectId {
        self.target
    }

    pub fn arm(&self) -> Arm {
        self.arm
    }

    pub(crate) fn update(&mut self, ctx: &TickContext<'_>, hands: &mut Hands) -> Step {
        if hands.held(self.arm).is_some() {
            return Step::failure(FailureReason::HandOccupied);
        }
        if !ctx.world.contains_object(self.target) {
            return Step::failure(FailureReason::UnknownObject(self.target));
        }
        if let Some(other) = hands.holding(self.target) {
            debug!(object = self.target, from = %other, to = %self.arm, "handing over");
            hands.release(other);
        }

        let mut instructions = vec![Instruction::AttachObject {
            id: ctx.agent_id,
            object_id: self.target,
            arm: self.arm,
            offset: self.offset,
        }];
        instructions.extend(ctx.world.with_contents(self.target).into_iter().map(|object_id| {
            Instruction::SetKinematic {
                object_id,
                is_kinematic: true,
            }
        }));

        hands.grasp(self.arm, self.target);
        if let Some(pin) = self.pin {
            hands.attach(
                self.target,
                Attachment {
                    arm: self.arm,
                    axis: pin.axis,
                    angle: pin.angle,
                    relative_to_hand: pin.relative_to_hand,
                },
            );
        }
        Step::success(instructions)
    }
}

/// Release whatever one hand holds and wait for it to come to rest.
#[derive(Debug, Clone)]
pub struct Drop {
    arm: Arm,
    offset: DropOffset,
    max_num_frames: u32,
    dropped: Option<ObjectId>,
    frames: u32,
}

impl Drop {
    /// Fails when `max_num_frames` is zero or the offset is not finite.
    pub fn new(arm: Arm, offset: DropOffset, max_num_frames: u32) -> Result<Self, ReplicantError> {
        if max_num_frames == 0 {
            return Err(ReplicantError::invalid("max_num_frames", "must be at least 1"));
        }
        let finite = match offset {
            DropOffset::Forward(d) => d.is_finite(),
            DropOffset::Position(p) => Vec3::is_finite(p),
        };
        if !finite {
            return Err(ReplicantError::invalid("offset", "must be finite"));
        }
        Ok(Self {
            arm,
            offset,
            max_num_frames,
            dropped: None,
            frames: 0,
        })
    }

    pub fn arm(&self) -> Arm {
        self.arm
    }

    /// The released object, once the drop has started.
    pub fn dropped(&self) -> Option<ObjectId> {
        self.dropped
    }

    pub(crate) fn update(&mut self, ctx: &TickContext<'_>, hands: &mut Hands) -> Step {
        let Some(object) = self.dropped else {
            let Some(object) = hands.release(self.arm) else {
                return Step::failure(FailureReason::HandEmpty);
            };
            self.dropped = Some(object);
            self.frames = 0;

            let mut instructions = vec![Instruction::DetachObject {
                id: ctx.agent_id,
                object_id: object,
                offset: self.offset,
            }];
            instructions.extend(ctx.world.with_contents(object).into_iter().map(|object_id| {
                Instruction::SetKinematic {
                    object_id,
                    is_kinematic: false,
                }
            }));
            return Step::running(instructions);
        };

        self.frames += 1;
        let settled = ctx
            .world
            .motion(object)
            .is_some_and(|m| m.is_settled(SETTLED_SPEED));
        if settled {
            return Step::success(Vec::new());
        }
        if self.frames >= self.max_num_frames {
            return Step::failure(FailureReason::DropTimeout);
        }
        Step::running(Vec::new())
    }
}
