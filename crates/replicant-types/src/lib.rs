//! `replicant-types` – shared data model for the replicant action engine.
//!
//! Every other crate in the workspace speaks in these types: identifiers,
//! geometry, the [`Instruction`] / [`ResponseFrame`] wire enums, action
//! outcomes and the global [`ReplicantError`].

pub mod geometry;
pub mod wire;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use geometry::{Quaternion, Vec3};
pub use wire::{
    BodyPart, Collider, ColliderKind, DropOffset, Instruction, OutputData, PathRegion,
    ResponseFrame,
};

/// Identifier of a replicant, object, wall segment or body part in the
/// simulation.
pub type ObjectId = u32;

/// One of the replicant's two arms.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Arm {
    Left,
    Right,
}

impl Arm {
    pub const BOTH: [Arm; 2] = [Arm::Left, Arm::Right];

    /// The opposite arm.
    pub fn other(self) -> Arm {
        match self {
            Arm::Left => Arm::Right,
            Arm::Right => Arm::Left,
        }
    }
}

impl fmt::Display for Arm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arm::Left => write!(f, "left"),
            Arm::Right => write!(f, "right"),
        }
    }
}

impl FromStr for Arm {
    type Err = ReplicantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Arm::Left),
            "right" => Ok(Arm::Right),
            other => Err(ReplicantError::InvalidParameter {
                name: "arm".to_string(),
                reason: format!("unknown arm '{other}'"),
            }),
        }
    }
}

/// A named rotation axis in the agent's local frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Pitch,
    Yaw,
    Roll,
}

impl Axis {
    /// The local unit vector this axis rotates around.
    pub fn vector(self) -> Vec3 {
        match self {
            Axis::Pitch => Vec3::RIGHT,
            Axis::Yaw => Vec3::UP,
            Axis::Roll => Vec3::FORWARD,
        }
    }
}

impl FromStr for Axis {
    type Err = ReplicantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pitch" => Ok(Axis::Pitch),
            "yaw" => Ok(Axis::Yaw),
            "roll" => Ok(Axis::Roll),
            other => Err(ReplicantError::UnknownAxis(other.to_string())),
        }
    }
}

/// Neutral position of a hand in the replicant's local frame.
pub fn neutral_hand_offset(arm: Arm) -> Vec3 {
    match arm {
        Arm::Left => Vec3::new(-0.2, 0.95, 0.1),
        Arm::Right => Vec3::new(0.2, 0.95, 0.1),
    }
}

/// Height of the head pivot above the replicant's base.
pub const HEAD_HEIGHT: f32 = 1.6;

/// Position plus rotation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quaternion,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quaternion) -> Self {
        Self { position, rotation }
    }
}

/// Something an action can aim at: a live object or a fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Object(ObjectId),
    Position(Vec3),
}

impl From<ObjectId> for Target {
    fn from(id: ObjectId) -> Self {
        Target::Object(id)
    }
}

impl From<Vec3> for Target {
    fn from(position: Vec3) -> Self {
        Target::Position(position)
    }
}

/// Per-wheel drive parameters for wheel-driven locomotion.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct WheelValues {
    pub left_motor_torque: f32,
    pub right_motor_torque: f32,
    /// Steering angle of the front wheels in degrees.
    pub steer_angle: f32,
    pub brake_torque: f32,
}

impl WheelValues {
    pub fn is_finite(&self) -> bool {
        self.left_motor_torque.is_finite()
            && self.right_motor_torque.is_finite()
            && self.steer_angle.is_finite()
            && self.brake_torque.is_finite()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Action outcomes
// ────────────────────────────────────────────────────────────────────────────

/// Why an action ended in failure.  Failures are ordinary outcomes; none of
/// them interrupt the tick loop.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    #[error("previous action of the same kind failed on a collision")]
    PreviousFailureCarryOver,
    #[error("obstacle detected ahead")]
    ObstacleAvoided,
    #[error("collided with a wall")]
    WallCollision,
    #[error("collided with an object")]
    ObjectCollision,
    #[error("target is beyond reach")]
    TargetTooFar,
    #[error("motion ended short of the target")]
    NotArrived,
    #[error("hand is already holding an object")]
    HandOccupied,
    #[error("hand is not holding an object")]
    HandEmpty,
    #[error("dropped object did not settle in time")]
    DropTimeout,
    #[error("object {0} is not present in the scene")]
    UnknownObject(ObjectId),
}

impl FailureReason {
    /// Failures that block an immediately following motion in the same
    /// direction when the policy's `previous_was_same` flag is set.
    pub fn is_collision(self) -> bool {
        matches!(
            self,
            FailureReason::PreviousFailureCarryOver
                | FailureReason::ObstacleAvoided
                | FailureReason::WallCollision
                | FailureReason::ObjectCollision
        )
    }
}

/// Lifecycle state of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Ongoing,
    Success,
    Failure(FailureReason),
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ActionStatus::Ongoing)
    }

    pub fn failure(self) -> Option<FailureReason> {
        match self {
            ActionStatus::Failure(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Ongoing => write!(f, "ongoing"),
            ActionStatus::Success => write!(f, "success"),
            ActionStatus::Failure(reason) => write!(f, "failure ({reason})"),
        }
    }
}

/// Record of an action reaching its terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub agent_id: ObjectId,
    /// Action kind, e.g. `"move_by"`.
    pub action: String,
    /// Session tick on which the action terminated.
    pub tick: u64,
    pub status: ActionStatus,
}

impl ActionEvent {
    pub fn new(agent_id: ObjectId, action: impl Into<String>, tick: u64, status: ActionStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            agent_id,
            action: action.into(),
            tick,
            status,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Global error type: parameter validation, transport and configuration
/// failures.  Per-tick action failures are [`FailureReason`]s instead.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplicantError {
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Unknown axis '{0}' (expected pitch, yaw or roll)")]
    UnknownAxis(String),

    #[error("Arm motion needs at least one target")]
    EmptyTargets,

    #[error("No replicant with id {0}")]
    UnknownAgent(ObjectId),

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

impl ReplicantError {
    /// Shorthand for [`ReplicantError::InvalidParameter`].
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        ReplicantError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
