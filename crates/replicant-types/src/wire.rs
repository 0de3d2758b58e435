//! Wire types exchanged with the simulator each tick.
//!
//! [`Instruction`]s flow out to the simulator; [`ResponseFrame`]s flow back.
//! Both serialise as internally tagged JSON objects with a `"$type"` field in
//! snake_case, e.g. `{"$type": "set_wheels", "id": 0, ...}`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::geometry::{Quaternion, Vec3};
use crate::{Arm, Axis, ObjectId, WheelValues};

// ────────────────────────────────────────────────────────────────────────────
// Shared enums
// ────────────────────────────────────────────────────────────────────────────

/// What a replicant touched or is about to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ColliderKind {
    Wall,
    Object,
}

/// A collider identified by kind and id.  Walls carry the id of their
/// environment segment so they can be excluded like objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Collider {
    pub kind: ColliderKind,
    pub id: ObjectId,
}

impl Collider {
    pub fn wall(id: ObjectId) -> Self {
        Self {
            kind: ColliderKind::Wall,
            id,
        }
    }

    pub fn object(id: ObjectId) -> Self {
        Self {
            kind: ColliderKind::Object,
            id,
        }
    }
}

/// The part of a replicant's body that reported a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BodyPart {
    Base,
    Arm(Arm),
    Head,
}

/// The swept region in which an obstacle was detected before contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PathRegion {
    Forward,
    Backward,
    Arm(Arm),
}

/// Where a dropped object is placed just before it is released.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DropOffset {
    /// Distance along the agent's forward axis from the current position.
    Forward(f32),
    /// Explicit world-space position.
    Position(Vec3),
}

impl Default for DropOffset {
    fn default() -> Self {
        DropOffset::Forward(0.1)
    }
}

/// Output data categories that the simulator can be asked to report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputData {
    Replicants,
    Transforms,
    Rigidbodies,
    Bounds,
    Affordances,
    Containment,
    Collisions,
    Framerate,
}

impl OutputData {
    pub const ALL: [OutputData; 8] = [
        OutputData::Replicants,
        OutputData::Transforms,
        OutputData::Rigidbodies,
        OutputData::Bounds,
        OutputData::Affordances,
        OutputData::Containment,
        OutputData::Collisions,
        OutputData::Framerate,
    ];
}

// ────────────────────────────────────────────────────────────────────────────
// Instruction
// ────────────────────────────────────────────────────────────────────────────

/// One low-level command sent to the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "$type", rename_all = "snake_case")]
pub enum Instruction {
    /// Build an empty square room whose walls sit at `±half_extent`.
    CreateRoom { half_extent: f32 },
    /// Spawn a replicant body.
    AddReplicant {
        id: ObjectId,
        position: Vec3,
        rotation: Quaternion,
    },
    /// Spawn a floor object.  `affordances` are local-space offsets of
    /// authored grasp points; `inside` names a containing object.
    AddObject {
        object_id: ObjectId,
        name: String,
        position: Vec3,
        radius: f32,
        height: f32,
        #[serde(default)]
        affordances: Vec<Vec3>,
        #[serde(default)]
        inside: Option<ObjectId>,
    },
    SetTargetFramerate { framerate: u32 },
    /// Ask the simulator to report a category of output data every tick.
    SendOutput { data: OutputData },
    /// Drive the wheels of a replicant.
    SetWheels { id: ObjectId, wheels: WheelValues },
    /// Release the motors and hold the base in place.
    Brake { id: ObjectId },
    /// Move a hand back to its neutral position over `duration` seconds.
    ResetArm {
        id: ObjectId,
        arm: Arm,
        duration: f32,
    },
    /// Set the world-space IK target of a hand for this tick.
    SetHandTarget {
        id: ObjectId,
        arm: Arm,
        position: Vec3,
    },
    /// Freeze a hand where it currently is.
    StopArm { id: ObjectId, arm: Arm },
    /// Set the head rotation relative to the body.
    SetHeadRotation { id: ObjectId, rotation: Quaternion },
    /// Parent an object to a hand, `offset` metres in front of the palm.
    AttachObject {
        id: ObjectId,
        object_id: ObjectId,
        arm: Arm,
        offset: f32,
    },
    /// Unparent a held object after applying `offset`.
    DetachObject {
        id: ObjectId,
        object_id: ObjectId,
        offset: DropOffset,
    },
    SetKinematic { object_id: ObjectId, is_kinematic: bool },
    /// Hold a grasped object at a fixed rotation relative to the hand (or
    /// the replicant when `relative_to_hand` is false).
    PinHeldRotation {
        id: ObjectId,
        object_id: ObjectId,
        arm: Arm,
        axis: Axis,
        angle: f32,
        relative_to_hand: bool,
    },
}

impl Instruction {
    /// `true` for instructions that set a body part in motion.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            Instruction::SetWheels { .. }
                | Instruction::ResetArm { .. }
                | Instruction::SetHandTarget { .. }
                | Instruction::SetHeadRotation { .. }
        )
    }

    /// The replicant this instruction is addressed to, if any.
    pub fn agent_id(&self) -> Option<ObjectId> {
        match self {
            Instruction::AddReplicant { id, .. }
            | Instruction::SetWheels { id, .. }
            | Instruction::Brake { id }
            | Instruction::ResetArm { id, .. }
            | Instruction::SetHandTarget { id, .. }
            | Instruction::StopArm { id, .. }
            | Instruction::SetHeadRotation { id, .. }
            | Instruction::AttachObject { id, .. }
            | Instruction::DetachObject { id, .. }
            | Instruction::PinHeldRotation { id, .. } => Some(*id),
            _ => None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ResponseFrame
// ────────────────────────────────────────────────────────────────────────────

/// One frame of output data reported by the simulator after a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "$type", rename_all = "snake_case")]
pub enum ResponseFrame {
    /// Body state of a replicant.  Hand positions are world-space; the head
    /// rotation is relative to the body.
    Replicant {
        id: ObjectId,
        position: Vec3,
        rotation: Quaternion,
        left_hand: Vec3,
        right_hand: Vec3,
        head_rotation: Quaternion,
    },
    Transform {
        id: ObjectId,
        position: Vec3,
        rotation: Quaternion,
    },
    Rigidbody {
        id: ObjectId,
        velocity: Vec3,
        sleeping: bool,
    },
    /// Axis-aligned bounds extremes of an object.
    Bounds {
        id: ObjectId,
        center: Vec3,
        front: Vec3,
        back: Vec3,
        left: Vec3,
        right: Vec3,
        top: Vec3,
        bottom: Vec3,
    },
    /// World-space affordance points of an object.
    Affordances { id: ObjectId, points: Vec<Vec3> },
    Containment {
        id: ObjectId,
        contained: Vec<ObjectId>,
    },
    /// A body part of `agent_id` is touching `collider` this tick.
    Contact {
        agent_id: ObjectId,
        part: BodyPart,
        collider: Collider,
    },
    /// `collider` lies in `region` of `agent_id`'s intended path.
    Obstacle {
        agent_id: ObjectId,
        region: PathRegion,
        collider: Collider,
    },
    Framerate { framerate: u32 },
}
