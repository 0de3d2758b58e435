//! [`Replicant`] – one wheeled humanoid agent.
//!
//! A replicant owns its action scheduler, its hands and its collision
//! policy.  Each tick the [`Session`][crate::session::Session] hands it the
//! shared [`WorldState`]; it advances its active action and buffers the
//! resulting instructions for the next round-trip.  Callers start actions
//! through the intent methods (`move_by`, `reach_for`, `grasp`, ...), which
//! validate parameters before anything is scheduled.

use replicant_kernel::{CollisionEvaluator, CollisionPolicy};
use replicant_perception::world::BodyState;
use replicant_perception::WorldState;
use replicant_types::{
    ActionEvent, ActionStatus, Arm, Axis, DropOffset, Instruction, ObjectId, OutputData, Pose,
    ReplicantError, Target,
};
use tracing::{debug, info, instrument};

use crate::actions::{
    Action, ActionKind, ArmTarget, Drop, Grasp, Hands, HeadParams, LookAt, MoveBy, MoveParams,
    MoveTo, ReachFor, ReachParams, ResetHead, RotateHead, TickContext, TurnBy, TurnTo,
};
use crate::scheduler::ActionScheduler;

/// Framerate a replicant asks the simulator for unless told otherwise.
pub const DEFAULT_TARGET_FRAMERATE: u32 = 100;

/// An agent in the scene and its action state.
#[derive(Debug)]
pub struct Replicant {
    id: ObjectId,
    initial: Pose,
    body: Option<BodyState>,
    /// Collision categories that abort motion; may be changed between
    /// ticks.
    pub collision_detection: CollisionPolicy,
    hands: Hands,
    scheduler: ActionScheduler,
    evaluator: CollisionEvaluator,
    /// Instructions queued by the caller or by a displaced action.
    pending: Vec<Instruction>,
    /// Instructions produced by the last tick.
    outgoing: Vec<Instruction>,
    initialized: bool,
    tick_rate: f32,
    target_framerate: u32,
    events: Vec<ActionEvent>,
}

impl Replicant {
    pub fn new(id: ObjectId, pose: Pose) -> Self {
        Self {
            id,
            initial: pose,
            body: None,
            collision_detection: CollisionPolicy::default(),
            hands: Hands::default(),
            scheduler: ActionScheduler::new(),
            evaluator: CollisionEvaluator::standard(),
            pending: Vec::new(),
            outgoing: Vec::new(),
            initialized: false,
            tick_rate: DEFAULT_TARGET_FRAMERATE as f32,
            target_framerate: DEFAULT_TARGET_FRAMERATE,
            events: Vec::new(),
        }
    }

    /// Framerate requested from the simulator at initialization.
    pub fn with_target_framerate(mut self, framerate: u32) -> Self {
        self.target_framerate = framerate.max(1);
        self.tick_rate = self.target_framerate as f32;
        self
    }

    /// Replace the collision rule engine.
    pub fn with_evaluator(mut self, evaluator: CollisionEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Body state from the latest tick, if the simulator reported one.
    pub fn body(&self) -> Option<&BodyState> {
        self.body.as_ref()
    }

    /// Latest reported pose, or the spawn pose before the first tick.
    pub fn pose(&self) -> Pose {
        self.body.map_or(self.initial, |b| b.pose())
    }

    pub fn hands(&self) -> &Hands {
        &self.hands
    }

    pub fn tick_rate(&self) -> f32 {
        self.tick_rate
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The active action, else the most recently ended one.
    pub fn action(&self) -> Option<&Action> {
        self.scheduler
            .active()
            .or_else(|| self.scheduler.last_action())
    }

    pub fn status(&self) -> Option<ActionStatus> {
        self.action().map(Action::status)
    }

    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Spawn, framerate and output requests; returned once until the next
    /// [`reset`][Self::reset].
    pub fn initialization_instructions(&mut self) -> Vec<Instruction> {
        if self.initialized {
            return Vec::new();
        }
        self.initialized = true;
        let mut instructions = vec![
            Instruction::AddReplicant {
                id: self.id,
                position: self.initial.position,
                rotation: self.initial.rotation,
            },
            Instruction::SetTargetFramerate {
                framerate: self.target_framerate,
            },
        ];
        instructions.extend(
            OutputData::ALL
                .into_iter()
                .map(|data| Instruction::SendOutput { data }),
        );
        instructions
    }

    /// Forget all action and hand state, restore the default collision
    /// policy and respawn at `pose` on the next round-trip.
    pub fn reset(&mut self, pose: Pose) {
        info!(agent = self.id, "replicant reset");
        self.initial = pose;
        self.body = None;
        self.hands.clear();
        self.scheduler.clear();
        self.pending.clear();
        self.outgoing.clear();
        self.events.clear();
        self.collision_detection = CollisionPolicy::default();
        self.initialized = false;
    }

    /// Queue an ad-hoc instruction for the next round-trip.
    pub fn send(&mut self, instruction: Instruction) {
        self.pending.push(instruction);
    }

    /// Replace the active action.
    pub fn set_action(&mut self, kind: impl Into<ActionKind>) {
        let action = Action::new(kind);
        info!(agent = self.id, action = action.name(), "action started");
        let halt = self.scheduler.set_action(self.id, action);
        self.pending.extend(halt);
    }

    /// Stop the active action without recording a failure.
    pub fn cancel_action(&mut self) {
        let halt = self.scheduler.cancel(self.id);
        self.pending.extend(halt);
    }

    // ── Intents ─────────────────────────────────────────────────────────────

    pub fn move_by(&mut self, distance: f32, params: MoveParams) -> Result<(), ReplicantError> {
        self.set_action(MoveBy::new(distance, params)?);
        Ok(())
    }

    pub fn move_to(&mut self, target: impl Into<Target>, params: MoveParams) -> Result<(), ReplicantError> {
        self.set_action(MoveTo::new(target, params)?);
        Ok(())
    }

    pub fn turn_by(&mut self, angle: f32, params: MoveParams) -> Result<(), ReplicantError> {
        self.set_action(TurnBy::new(angle, params)?);
        Ok(())
    }

    pub fn turn_to(&mut self, target: impl Into<Target>, params: MoveParams) -> Result<(), ReplicantError> {
        self.set_action(TurnTo::new(target, params)?);
        Ok(())
    }

    pub fn reach_for<I, T>(&mut self, targets: I, params: ReachParams) -> Result<(), ReplicantError>
    where
        I: IntoIterator<Item = T>,
        T: Into<ArmTarget>,
    {
        self.set_action(ReachFor::new(targets, params)?);
        Ok(())
    }

    pub fn reset_arm(
        &mut self,
        arms: &[Arm],
        duration: f32,
        scale_duration: bool,
    ) -> Result<(), ReplicantError> {
        self.set_action(ActionKind::ResetArm(ReachFor::reset(
            arms,
            duration,
            scale_duration,
        )?));
        Ok(())
    }

    /// Grasp `target` with `arm`; `pin` holds it at a fixed rotation
    /// (axis, degrees, relative to hand) until it is dropped.
    pub fn grasp(
        &mut self,
        target: ObjectId,
        arm: Arm,
        pin: Option<(Axis, f32, bool)>,
    ) -> Result<(), ReplicantError> {
        let mut grasp = Grasp::new(target, arm);
        if let Some((axis, angle, relative_to_hand)) = pin {
            grasp = grasp.with_pin(axis, angle, relative_to_hand)?;
        }
        self.set_action(grasp);
        Ok(())
    }

    pub fn drop(
        &mut self,
        arm: Arm,
        offset: DropOffset,
        max_num_frames: u32,
    ) -> Result<(), ReplicantError> {
        self.set_action(Drop::new(arm, offset, max_num_frames)?);
        Ok(())
    }

    pub fn look_at(&mut self, target: impl Into<Target>, params: HeadParams) -> Result<(), ReplicantError> {
        self.set_action(LookAt::new(target, params)?);
        Ok(())
    }

    pub fn rotate_head(&mut self, axis: Axis, angle: f32, params: HeadParams) -> Result<(), ReplicantError> {
        self.set_action(RotateHead::new(axis, angle, params)?);
        Ok(())
    }

    pub fn reset_head(&mut self, params: HeadParams) -> Result<(), ReplicantError> {
        self.set_action(ResetHead::new(params)?);
        Ok(())
    }

    // ── Tick ────────────────────────────────────────────────────────────────

    /// Observe one tick's world and advance the active action.
    #[instrument(skip_all, fields(agent = self.id, tick = tick))]
    pub fn on_response(&mut self, world: &WorldState, tick: u64) {
        if let Some(framerate) = world.framerate().filter(|f| *f > 0) {
            self.tick_rate = framerate as f32;
        }
        self.outgoing.clear();

        let Some(body) = world.body(self.id).copied() else {
            debug!("no body reported");
            return;
        };
        self.body = Some(body);

        let ctx = TickContext {
            agent_id: self.id,
            world,
            body: &body,
            policy: &self.collision_detection,
            evaluator: &self.evaluator,
            previous: None,
            tick_rate: self.tick_rate,
        };
        if let Some(step) = self.scheduler.advance(&ctx, &mut self.hands) {
            if step.status.is_terminal() {
                let name = self.scheduler.last_action().map_or("unknown", Action::name);
                info!(action = name, status = %step.status, "action ended");
                self.events
                    .push(ActionEvent::new(self.id, name, tick, step.status));
            }
            self.outgoing.extend(step.instructions);
        }
        self.outgoing.extend(self.hands.pin_instructions(self.id));
    }

    /// `true` when the next round-trip carries instructions from this
    /// replicant.
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty() || !self.pending.is_empty()
    }

    /// The last tick's instructions followed by queued ones.
    pub fn take_outgoing(&mut self) -> Vec<Instruction> {
        let mut batch = std::mem::take(&mut self.outgoing);
        batch.append(&mut self.pending);
        batch
    }

    /// Terminal outcomes recorded since the last call.
    pub fn take_events(&mut self) -> Vec<ActionEvent> {
        std::mem::take(&mut self.events)
    }
}
