//! In-process deterministic simulator for headless tests and the CLI.
//!
//! [`SimWorld`] implements [`Transport`] with simple kinematics: a square
//! room of walls, cylindrical floor objects, torque-driven replicant bases,
//! hands that track their commanded targets at a bounded speed, a kinematic
//! head, held objects that follow their hand and dropped objects that fall
//! to the floor.  Each call to [`Transport::communicate`] applies the
//! instruction batch, advances one fixed step of `1/60` s and reports the
//! output categories requested through [`Instruction::SendOutput`].
//!
//! # Example
//!
//! ```rust
//! use replicant_hal::sim::{ObjectSpec, SimWorld};
//! use replicant_hal::transport::Transport;
//! use replicant_types::{Instruction, OutputData, Quaternion, Vec3};
//!
//! let mut world = SimWorld::builder()
//!     .room(4.0)
//!     .object(ObjectSpec::new(10, "mug", Vec3::new(0.0, 0.0, 1.0)))
//!     .build();
//!
//! let frames = world
//!     .communicate(vec![
//!         Instruction::AddReplicant {
//!             id: 0,
//!             position: Vec3::zero(),
//!             rotation: Quaternion::identity(),
//!         },
//!         Instruction::SendOutput { data: OutputData::Replicants },
//!     ])
//!     .unwrap();
//! assert_eq!(frames.len(), 1);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use replicant_types::{
    Arm, BodyPart, Collider, DropOffset, Instruction, ObjectId, OutputData, PathRegion, Pose,
    Quaternion, ReplicantError, ResponseFrame, Vec3, WheelValues, neutral_hand_offset,
};
use tracing::{debug, warn};

use crate::transport::Transport;

/// Fixed physics step in seconds.
pub const DT: f32 = 1.0 / 60.0;
/// Radius of a replicant's base.
pub const AGENT_RADIUS: f32 = 0.3;
/// How far ahead (and behind) of the base obstacles are looked for.
pub const OBSTACLE_PROBE: f32 = 0.8;
/// Maximum distance a hand travels in one step.
pub const HAND_STEP: f32 = 0.05;

pub const WALL_NORTH: ObjectId = 9000;
pub const WALL_SOUTH: ObjectId = 9001;
pub const WALL_EAST: ObjectId = 9002;
pub const WALL_WEST: ObjectId = 9003;

const PROBE_RADIUS: f32 = 0.2;
const SPEED_PER_TORQUE: f32 = 0.6;
const YAW_RATE_PER_TORQUE: f32 = 40.0;
const GRAVITY: f32 = 9.81;
const REST_SPEED: f32 = 1e-4;

// ────────────────────────────────────────────────────────────────────────────
// Scene records
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct SimAgent {
    position: Vec3,
    rotation: Quaternion,
    wheels: WheelValues,
    braking: bool,
    /// Hand positions in the local frame, indexed by [`arm_index`].
    hands: [Vec3; 2],
    hand_targets: [Vec3; 2],
    head_rotation: Quaternion,
}

impl SimAgent {
    fn new(position: Vec3, rotation: Quaternion) -> Self {
        let neutral = [neutral_hand_offset(Arm::Left), neutral_hand_offset(Arm::Right)];
        Self {
            position,
            rotation,
            wheels: WheelValues::default(),
            braking: false,
            hands: neutral,
            hand_targets: neutral,
            head_rotation: Quaternion::identity(),
        }
    }

    fn to_world(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation.rotate(local)
    }

    fn to_local(&self, world: Vec3) -> Vec3 {
        self.rotation.conjugate().rotate(world - self.position)
    }

    fn hand(&self, arm: Arm) -> Vec3 {
        self.to_world(self.hands[arm_index(arm)])
    }

    fn forward(&self) -> Vec3 {
        self.rotation.forward().horizontal().normalized()
    }
}

#[derive(Debug, Clone, Copy)]
struct Grip {
    agent: ObjectId,
    arm: Arm,
    offset: f32,
}

#[derive(Debug, Clone)]
struct SimObject {
    name: String,
    position: Vec3,
    rotation: Quaternion,
    radius: f32,
    height: f32,
    affordances: Vec<Vec3>,
    velocity: Vec3,
    kinematic: bool,
    grip: Option<Grip>,
    pin: Option<Quaternion>,
    /// Container id and offset from the container's position.
    inside: Option<(ObjectId, Vec3)>,
}

fn arm_index(arm: Arm) -> usize {
    match arm {
        Arm::Left => 0,
        Arm::Right => 1,
    }
}

fn horizontal_distance(a: Vec3, b: Vec3) -> f32 {
    (a - b).horizontal().length()
}

/// Horizontal distance from `p` to the segment `a..b`.
fn segment_distance(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let (p, a, b) = (p.horizontal(), a.horizontal(), b.horizontal());
    let ab = b - a;
    let len2 = ab.dot(ab);
    if len2 <= f32::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

/// The wall `p` lies beyond, if any.
fn wall_beyond(p: Vec3, limit: f32) -> Option<ObjectId> {
    if p.z > limit {
        Some(WALL_NORTH)
    } else if p.z < -limit {
        Some(WALL_SOUTH)
    } else if p.x > limit {
        Some(WALL_EAST)
    } else if p.x < -limit {
        Some(WALL_WEST)
    } else {
        None
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ObjectSpec
// ────────────────────────────────────────────────────────────────────────────

/// Description of a floor object to add to a [`SimWorld`].
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSpec {
    pub id: ObjectId,
    pub name: String,
    pub position: Vec3,
    pub radius: f32,
    pub height: f32,
    /// Local-space grasp points.
    pub affordances: Vec<Vec3>,
    pub inside: Option<ObjectId>,
}

impl ObjectSpec {
    /// A 0.2 m tall object of radius 0.1 m.
    pub fn new(id: ObjectId, name: impl Into<String>, position: Vec3) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            radius: 0.1,
            height: 0.2,
            affordances: Vec::new(),
            inside: None,
        }
    }

    pub fn radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn height(mut self, height: f32) -> Self {
        self.height = height;
        self
    }

    pub fn affordance(mut self, local: Vec3) -> Self {
        self.affordances.push(local);
        self
    }

    pub fn inside(mut self, container: ObjectId) -> Self {
        self.inside = Some(container);
        self
    }
}

impl From<ObjectSpec> for Instruction {
    fn from(spec: ObjectSpec) -> Self {
        Instruction::AddObject {
            object_id: spec.id,
            name: spec.name,
            position: spec.position,
            radius: spec.radius,
            height: spec.height,
            affordances: spec.affordances,
            inside: spec.inside,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimWorld builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder that constructs a [`SimWorld`] with a room and scene objects
/// already in place.
#[derive(Debug, Default)]
pub struct SimWorldBuilder {
    setup: Vec<Instruction>,
}

impl SimWorldBuilder {
    /// Enclose the scene in walls at `±half_extent`.
    pub fn room(mut self, half_extent: f32) -> Self {
        self.setup.push(Instruction::CreateRoom { half_extent });
        self
    }

    pub fn object(mut self, spec: ObjectSpec) -> Self {
        self.setup.push(spec.into());
        self
    }

    pub fn framerate(mut self, framerate: u32) -> Self {
        self.setup.push(Instruction::SetTargetFramerate { framerate });
        self
    }

    pub fn build(self) -> SimWorld {
        let mut world = SimWorld::new();
        for instruction in &self.setup {
            world.apply(instruction);
        }
        world
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimWorld
// ────────────────────────────────────────────────────────────────────────────

/// A deterministic, single-threaded stand-in for the simulator process.
#[derive(Debug, Clone)]
pub struct SimWorld {
    half_extent: Option<f32>,
    agents: BTreeMap<ObjectId, SimAgent>,
    objects: BTreeMap<ObjectId, SimObject>,
    outputs: BTreeSet<OutputData>,
    framerate: u32,
    frame: u64,
    events: Vec<ResponseFrame>,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    /// An empty, wall-less scene.
    pub fn new() -> Self {
        Self {
            half_extent: None,
            agents: BTreeMap::new(),
            objects: BTreeMap::new(),
            outputs: BTreeSet::new(),
            framerate: 60,
            frame: 0,
            events: Vec::new(),
        }
    }

    pub fn builder() -> SimWorldBuilder {
        SimWorldBuilder::default()
    }

    // ── Inspection ──────────────────────────────────────────────────────────

    /// Number of steps simulated so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn framerate(&self) -> u32 {
        self.framerate
    }

    pub fn agent_pose(&self, id: ObjectId) -> Option<Pose> {
        self.agents
            .get(&id)
            .map(|a| Pose::new(a.position, a.rotation))
    }

    pub fn hand_position(&self, id: ObjectId, arm: Arm) -> Option<Vec3> {
        self.agents.get(&id).map(|a| a.hand(arm))
    }

    pub fn head_rotation(&self, id: ObjectId) -> Option<Quaternion> {
        self.agents.get(&id).map(|a| a.head_rotation)
    }

    pub fn object_name(&self, id: ObjectId) -> Option<&str> {
        self.objects.get(&id).map(|o| o.name.as_str())
    }

    pub fn object_position(&self, id: ObjectId) -> Option<Vec3> {
        self.objects.get(&id).map(|o| o.position)
    }

    pub fn object_rotation(&self, id: ObjectId) -> Option<Quaternion> {
        self.objects.get(&id).map(|o| o.rotation)
    }

    pub fn object_velocity(&self, id: ObjectId) -> Option<Vec3> {
        self.objects.get(&id).map(|o| o.velocity)
    }

    pub fn is_kinematic(&self, id: ObjectId) -> Option<bool> {
        self.objects.get(&id).map(|o| o.kinematic)
    }

    /// The replicant and hand holding `id`, if any.
    pub fn holder(&self, id: ObjectId) -> Option<(ObjectId, Arm)> {
        self.objects
            .get(&id)
            .and_then(|o| o.grip)
            .map(|g| (g.agent, g.arm))
    }

    // ── Instructions ────────────────────────────────────────────────────────

    /// Apply one instruction to the scene.  Instructions addressed to
    /// unknown replicants or objects are dropped with a warning.
    pub fn apply(&mut self, instruction: &Instruction) {
        match instruction {
            Instruction::CreateRoom { half_extent } => {
                self.half_extent = Some(half_extent.abs());
            }
            Instruction::AddReplicant {
                id,
                position,
                rotation,
            } => {
                self.agents.insert(*id, SimAgent::new(*position, *rotation));
            }
            Instruction::AddObject {
                object_id,
                name,
                position,
                radius,
                height,
                affordances,
                inside,
            } => {
                let inside = inside.and_then(|c| {
                    self.objects
                        .get(&c)
                        .map(|container| (c, *position - container.position))
                });
                self.objects.insert(
                    *object_id,
                    SimObject {
                        name: name.clone(),
                        position: *position,
                        rotation: Quaternion::identity(),
                        radius: *radius,
                        height: *height,
                        affordances: affordances.clone(),
                        velocity: Vec3::zero(),
                        kinematic: false,
                        grip: None,
                        pin: None,
                        inside,
                    },
                );
            }
            Instruction::SetTargetFramerate { framerate } => {
                self.framerate = (*framerate).max(1);
            }
            Instruction::SendOutput { data } => {
                self.outputs.insert(*data);
            }
            Instruction::SetWheels { id, wheels } => {
                if let Some(agent) = self.agent_mut(*id) {
                    agent.wheels = *wheels;
                    agent.braking = wheels.brake_torque > 0.0;
                }
            }
            Instruction::Brake { id } => {
                if let Some(agent) = self.agent_mut(*id) {
                    agent.wheels = WheelValues::default();
                    agent.braking = true;
                }
            }
            Instruction::ResetArm { id, arm, .. } => {
                if let Some(agent) = self.agent_mut(*id) {
                    agent.hand_targets[arm_index(*arm)] = neutral_hand_offset(*arm);
                }
            }
            Instruction::SetHandTarget { id, arm, position } => {
                if let Some(agent) = self.agent_mut(*id) {
                    agent.hand_targets[arm_index(*arm)] = agent.to_local(*position);
                }
            }
            Instruction::StopArm { id, arm } => {
                if let Some(agent) = self.agent_mut(*id) {
                    let i = arm_index(*arm);
                    agent.hand_targets[i] = agent.hands[i];
                }
            }
            Instruction::SetHeadRotation { id, rotation } => {
                if let Some(agent) = self.agent_mut(*id) {
                    agent.head_rotation = rotation.normalized();
                }
            }
            Instruction::AttachObject {
                id,
                object_id,
                arm,
                offset,
            } => {
                if self.agent_mut(*id).is_none() {
                    return;
                }
                if let Some(object) = self.object_mut(*object_id) {
                    object.grip = Some(Grip {
                        agent: *id,
                        arm: *arm,
                        offset: *offset,
                    });
                    object.inside = None;
                    object.velocity = Vec3::zero();
                }
            }
            Instruction::DetachObject {
                id,
                object_id,
                offset,
            } => {
                let Some(forward) = self.agents.get(id).map(SimAgent::forward) else {
                    warn!(agent = id, "dropping detach for unknown replicant");
                    return;
                };
                if let Some(object) = self.object_mut(*object_id) {
                    object.grip = None;
                    object.pin = None;
                    object.velocity = Vec3::zero();
                    match offset {
                        DropOffset::Forward(d) => object.position = object.position + forward * *d,
                        DropOffset::Position(p) => object.position = *p,
                    }
                }
            }
            Instruction::SetKinematic {
                object_id,
                is_kinematic,
            } => {
                if let Some(object) = self.object_mut(*object_id) {
                    object.kinematic = *is_kinematic;
                }
            }
            Instruction::PinHeldRotation {
                object_id,
                axis,
                angle,
                ..
            } => {
                if let Some(object) = self.object_mut(*object_id) {
                    object.pin = Some(Quaternion::from_axis_angle(axis.vector(), *angle));
                }
            }
        }
    }

    fn agent_mut(&mut self, id: ObjectId) -> Option<&mut SimAgent> {
        let agent = self.agents.get_mut(&id);
        if agent.is_none() {
            warn!(agent = id, "dropping instruction for unknown replicant");
        }
        agent
    }

    fn object_mut(&mut self, id: ObjectId) -> Option<&mut SimObject> {
        let object = self.objects.get_mut(&id);
        if object.is_none() {
            warn!(object = id, "dropping instruction for unknown object");
        }
        object
    }

    // ── Physics ─────────────────────────────────────────────────────────────

    /// Advance the scene by one fixed step.
    pub fn step(&mut self) {
        self.events.clear();
        let ids: Vec<ObjectId> = self.agents.keys().copied().collect();
        for id in ids {
            self.step_agent(id);
        }
        self.step_objects();
        self.frame += 1;
    }

    fn step_agent(&mut self, id: ObjectId) {
        let Some(agent) = self.agents.get_mut(&id) else {
            return;
        };

        // Base.
        let w = agent.wheels;
        let (speed, yaw_rate) = if agent.braking {
            (0.0, 0.0)
        } else {
            (
                (w.left_motor_torque + w.right_motor_torque) * 0.5 * SPEED_PER_TORQUE,
                (w.left_motor_torque - w.right_motor_torque) * 0.5 * YAW_RATE_PER_TORQUE,
            )
        };
        if yaw_rate != 0.0 {
            agent.rotation = Quaternion::from_yaw(yaw_rate * DT)
                .mul(agent.rotation)
                .normalized();
        }
        let forward = agent.forward();
        agent.position = agent.position + forward * (speed * DT);

        let mut events = Vec::new();
        if let Some(half) = self.half_extent {
            let limit = half - AGENT_RADIUS;
            if let Some(wall) = wall_beyond(agent.position, limit) {
                agent.position.x = agent.position.x.clamp(-limit, limit);
                agent.position.z = agent.position.z.clamp(-limit, limit);
                events.push(ResponseFrame::Contact {
                    agent_id: id,
                    part: BodyPart::Base,
                    collider: Collider::wall(wall),
                });
            }
        }

        // Hands.
        for arm in Arm::BOTH {
            let i = arm_index(arm);
            let delta = agent.hand_targets[i] - agent.hands[i];
            agent.hands[i] = if delta.length() > HAND_STEP {
                agent.hands[i] + delta.normalized() * HAND_STEP
            } else {
                agent.hand_targets[i]
            };
        }

        let agent = agent.clone();
        let free = self.objects.iter().filter(|(_, o)| o.grip.is_none());

        for (oid, object) in free {
            if horizontal_distance(agent.position, object.position) < AGENT_RADIUS + object.radius {
                events.push(ResponseFrame::Contact {
                    agent_id: id,
                    part: BodyPart::Base,
                    collider: Collider::object(*oid),
                });
            }
            for arm in Arm::BOTH {
                let hand = agent.hand(arm);
                let within = horizontal_distance(hand, object.position) < object.radius
                    && hand.y >= object.position.y
                    && hand.y <= object.position.y + object.height;
                if within {
                    events.push(ResponseFrame::Contact {
                        agent_id: id,
                        part: BodyPart::Arm(arm),
                        collider: Collider::object(*oid),
                    });
                }
            }
            for (region, sign) in [(PathRegion::Forward, 1.0), (PathRegion::Backward, -1.0)] {
                let end = agent.position + forward * (sign * OBSTACLE_PROBE);
                if segment_distance(object.position, agent.position, end)
                    < object.radius + PROBE_RADIUS
                {
                    events.push(ResponseFrame::Obstacle {
                        agent_id: id,
                        region,
                        collider: Collider::object(*oid),
                    });
                }
            }
        }

        if let Some(half) = self.half_extent {
            for arm in Arm::BOTH {
                if let Some(wall) = wall_beyond(agent.hand(arm), half) {
                    events.push(ResponseFrame::Contact {
                        agent_id: id,
                        part: BodyPart::Arm(arm),
                        collider: Collider::wall(wall),
                    });
                }
            }
            for (region, sign) in [(PathRegion::Forward, 1.0), (PathRegion::Backward, -1.0)] {
                let end = agent.position + forward * (sign * OBSTACLE_PROBE);
                if let Some(wall) = wall_beyond(end, half) {
                    events.push(ResponseFrame::Obstacle {
                        agent_id: id,
                        region,
                        collider: Collider::wall(wall),
                    });
                }
            }
        }

        if !events.is_empty() {
            debug!(agent = id, count = events.len(), "collision events");
        }
        self.events.extend(events);
    }

    fn step_objects(&mut self) {
        // Held objects follow their hand.
        for object in self.objects.values_mut() {
            let Some(grip) = object.grip else {
                continue;
            };
            let Some(agent) = self.agents.get(&grip.agent) else {
                continue;
            };
            object.position = agent.hand(grip.arm) + agent.forward() * grip.offset;
            if let Some(pin) = object.pin {
                object.rotation = agent.rotation.mul(pin);
            }
            object.velocity = Vec3::zero();
        }

        // Free, dynamic objects fall to the floor.
        for object in self.objects.values_mut() {
            if object.grip.is_some() || object.inside.is_some() || object.kinematic {
                continue;
            }
            if object.position.y > 0.0 || object.velocity.length() > 0.0 {
                object.velocity.y -= GRAVITY * DT;
                object.position = object.position + object.velocity * DT;
                if object.position.y <= 0.0 {
                    object.position.y = 0.0;
                    object.velocity = Vec3::zero();
                }
            }
        }

        // Contents follow their container, nested containers included.
        for _ in 0..self.objects.len() {
            let snapshot: BTreeMap<ObjectId, (Vec3, Vec3)> = self
                .objects
                .iter()
                .map(|(id, o)| (*id, (o.position, o.velocity)))
                .collect();
            let mut moved = false;
            for object in self.objects.values_mut() {
                let Some((container, offset)) = object.inside else {
                    continue;
                };
                let Some((position, velocity)) = snapshot.get(&container) else {
                    continue;
                };
                let target = *position + offset;
                if target != object.position {
                    object.position = target;
                    moved = true;
                }
                object.velocity = *velocity;
            }
            if !moved {
                break;
            }
        }
    }

    // ── Output ──────────────────────────────────────────────────────────────

    /// Frames for every requested output category, plus this step's contact
    /// and obstacle events when collisions were requested.
    pub fn report(&self) -> Vec<ResponseFrame> {
        let mut frames = Vec::new();
        for data in &self.outputs {
            match data {
                OutputData::Replicants => {
                    for (id, a) in &self.agents {
                        frames.push(ResponseFrame::Replicant {
                            id: *id,
                            position: a.position,
                            rotation: a.rotation,
                            left_hand: a.hand(Arm::Left),
                            right_hand: a.hand(Arm::Right),
                            head_rotation: a.head_rotation,
                        });
                    }
                }
                OutputData::Transforms => {
                    for (id, o) in &self.objects {
                        frames.push(ResponseFrame::Transform {
                            id: *id,
                            position: o.position,
                            rotation: o.rotation,
                        });
                    }
                }
                OutputData::Rigidbodies => {
                    for (id, o) in &self.objects {
                        frames.push(ResponseFrame::Rigidbody {
                            id: *id,
                            velocity: o.velocity,
                            sleeping: o.grip.is_none() && o.velocity.length() < REST_SPEED,
                        });
                    }
                }
                OutputData::Bounds => {
                    for (id, o) in &self.objects {
                        let center = o.position + Vec3::new(0.0, o.height * 0.5, 0.0);
                        frames.push(ResponseFrame::Bounds {
                            id: *id,
                            center,
                            front: center + Vec3::new(0.0, 0.0, o.radius),
                            back: center - Vec3::new(0.0, 0.0, o.radius),
                            left: center - Vec3::new(o.radius, 0.0, 0.0),
                            right: center + Vec3::new(o.radius, 0.0, 0.0),
                            top: o.position + Vec3::new(0.0, o.height, 0.0),
                            bottom: o.position,
                        });
                    }
                }
                OutputData::Affordances => {
                    for (id, o) in self.objects.iter().filter(|(_, o)| !o.affordances.is_empty()) {
                        frames.push(ResponseFrame::Affordances {
                            id: *id,
                            points: o
                                .affordances
                                .iter()
                                .map(|p| o.position + o.rotation.rotate(*p))
                                .collect(),
                        });
                    }
                }
                OutputData::Containment => {
                    let mut contents: BTreeMap<ObjectId, Vec<ObjectId>> = BTreeMap::new();
                    for (id, o) in &self.objects {
                        if let Some((container, _)) = o.inside {
                            contents.entry(container).or_default().push(*id);
                        }
                    }
                    for (id, contained) in contents {
                        frames.push(ResponseFrame::Containment { id, contained });
                    }
                }
                OutputData::Collisions => frames.extend(self.events.iter().cloned()),
                OutputData::Framerate => frames.push(ResponseFrame::Framerate {
                    framerate: self.framerate,
                }),
            }
        }
        frames
    }
}

impl Transport for SimWorld {
    fn communicate(
        &mut self,
        instructions: Vec<Instruction>,
    ) -> Result<Vec<ResponseFrame>, ReplicantError> {
        for instruction in &instructions {
            self.apply(instruction);
        }
        self.step();
        Ok(self.report())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
