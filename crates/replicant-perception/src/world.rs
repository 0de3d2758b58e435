//! Per-tick world snapshot.
//!
//! [`WorldState::from_frames`] folds one response buffer into a single,
//! queryable view of the scene: object poses and velocities, bounds,
//! affordance points, containment, replicant body states and the contacts
//! and obstacles each replicant reported this tick.
//!
//! # Example
//!
//! ```rust
//! use replicant_perception::world::WorldState;
//! use replicant_types::{Quaternion, ResponseFrame, Vec3};
//!
//! let frames = vec![ResponseFrame::Transform {
//!     id: 7,
//!     position: Vec3::new(0.0, 0.0, 1.0),
//!     rotation: Quaternion::identity(),
//! }];
//! let world = WorldState::from_frames(&frames);
//! assert!(world.object(7).is_some());
//! ```

use std::collections::{BTreeMap, BTreeSet};

use replicant_types::{
    Arm, BodyPart, Collider, ObjectId, PathRegion, Pose, Quaternion, ResponseFrame, Vec3,
};
use tracing::trace;

// ────────────────────────────────────────────────────────────────────────────
// Snapshot records
// ────────────────────────────────────────────────────────────────────────────

/// Velocity of a rigidbody and whether the physics engine put it to sleep.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Motion {
    pub velocity: Vec3,
    pub sleeping: bool,
}

impl Motion {
    /// `true` once the body has come to rest.
    pub fn is_settled(&self, epsilon: f32) -> bool {
        self.sleeping || self.velocity.length() <= epsilon
    }
}

/// Axis-aligned bounds extremes of an object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub center: Vec3,
    pub front: Vec3,
    pub back: Vec3,
    pub left: Vec3,
    pub right: Vec3,
    pub top: Vec3,
    pub bottom: Vec3,
}

impl Bounds {
    pub fn points(&self) -> [Vec3; 7] {
        [
            self.center,
            self.front,
            self.back,
            self.left,
            self.right,
            self.top,
            self.bottom,
        ]
    }

    /// The bounds point closest to `p`.
    pub fn nearest_to(&self, p: Vec3) -> Vec3 {
        nearest(&self.points(), p).unwrap_or(self.center)
    }
}

/// Body state of one replicant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub position: Vec3,
    pub rotation: Quaternion,
    pub left_hand: Vec3,
    pub right_hand: Vec3,
    /// Head rotation relative to the body.
    pub head_rotation: Quaternion,
}

impl BodyState {
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }

    pub fn hand(&self, arm: Arm) -> Vec3 {
        match arm {
            Arm::Left => self.left_hand,
            Arm::Right => self.right_hand,
        }
    }
}

/// A body part touching a collider this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    pub part: BodyPart,
    pub collider: Collider,
}

/// A collider in the replicant's intended path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Obstacle {
    pub region: PathRegion,
    pub collider: Collider,
}

// ────────────────────────────────────────────────────────────────────────────
// WorldState
// ────────────────────────────────────────────────────────────────────────────

/// Everything the simulator reported in one response buffer.
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    objects: BTreeMap<ObjectId, Pose>,
    motions: BTreeMap<ObjectId, Motion>,
    bounds: BTreeMap<ObjectId, Bounds>,
    affordances: BTreeMap<ObjectId, Vec<Vec3>>,
    containment: BTreeMap<ObjectId, Vec<ObjectId>>,
    bodies: BTreeMap<ObjectId, BodyState>,
    contacts: BTreeMap<ObjectId, Vec<Contact>>,
    obstacles: BTreeMap<ObjectId, Vec<Obstacle>>,
    framerate: Option<u32>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from one tick's response frames.  Later frames for
    /// the same id overwrite earlier ones; contacts and obstacles accumulate.
    pub fn from_frames(frames: &[ResponseFrame]) -> Self {
        let mut world = Self::new();
        for frame in frames {
            world.ingest(frame);
        }
        trace!(
            objects = world.objects.len(),
            bodies = world.bodies.len(),
            "world snapshot built"
        );
        world
    }

    fn ingest(&mut self, frame: &ResponseFrame) {
        match frame {
            ResponseFrame::Replicant {
                id,
                position,
                rotation,
                left_hand,
                right_hand,
                head_rotation,
            } => {
                self.bodies.insert(
                    *id,
                    BodyState {
                        position: *position,
                        rotation: *rotation,
                        left_hand: *left_hand,
                        right_hand: *right_hand,
                        head_rotation: *head_rotation,
                    },
                );
            }
            ResponseFrame::Transform {
                id,
                position,
                rotation,
            } => {
                self.objects.insert(*id, Pose::new(*position, *rotation));
            }
            ResponseFrame::Rigidbody {
                id,
                velocity,
                sleeping,
            } => {
                self.motions.insert(
                    *id,
                    Motion {
                        velocity: *velocity,
                        sleeping: *sleeping,
                    },
                );
            }
            ResponseFrame::Bounds {
                id,
                center,
                front,
                back,
                left,
                right,
                top,
                bottom,
            } => {
                self.bounds.insert(
                    *id,
                    Bounds {
                        center: *center,
                        front: *front,
                        back: *back,
                        left: *left,
                        right: *right,
                        top: *top,
                        bottom: *bottom,
                    },
                );
            }
            ResponseFrame::Affordances { id, points } => {
                self.affordances.insert(*id, points.clone());
            }
            ResponseFrame::Containment { id, contained } => {
                self.containment.insert(*id, contained.clone());
            }
            ResponseFrame::Contact {
                agent_id,
                part,
                collider,
            } => {
                self.contacts.entry(*agent_id).or_default().push(Contact {
                    part: *part,
                    collider: *collider,
                });
            }
            ResponseFrame::Obstacle {
                agent_id,
                region,
                collider,
            } => {
                self.obstacles.entry(*agent_id).or_default().push(Obstacle {
                    region: *region,
                    collider: *collider,
                });
            }
            ResponseFrame::Framerate { framerate } => {
                self.framerate = Some(*framerate);
            }
        }
    }

    // ── Objects ─────────────────────────────────────────────────────────────

    pub fn object(&self, id: ObjectId) -> Option<&Pose> {
        self.objects.get(&id)
    }

    pub fn contains_object(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    pub fn motion(&self, id: ObjectId) -> Option<&Motion> {
        self.motions.get(&id)
    }

    pub fn bounds(&self, id: ObjectId) -> Option<&Bounds> {
        self.bounds.get(&id)
    }

    pub fn affordances(&self, id: ObjectId) -> &[Vec3] {
        self.affordances.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Objects directly inside `id`.
    pub fn contained(&self, id: ObjectId) -> &[ObjectId] {
        self.containment.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `id` followed by every object transitively inside it.
    pub fn with_contents(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            out.push(current);
            for child in self.contained(current).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    // ── Replicants ──────────────────────────────────────────────────────────

    pub fn body(&self, agent: ObjectId) -> Option<&BodyState> {
        self.bodies.get(&agent)
    }

    pub fn contacts(&self, agent: ObjectId) -> &[Contact] {
        self.contacts.get(&agent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn obstacles(&self, agent: ObjectId) -> &[Obstacle] {
        self.obstacles.get(&agent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn framerate(&self) -> Option<u32> {
        self.framerate
    }
}

/// The point in `points` closest to `p`.
pub fn nearest(points: &[Vec3], p: Vec3) -> Option<Vec3> {
    points
        .iter()
        .copied()
        .min_by(|a, b| a.distance(p).total_cmp(&b.distance(p)))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
