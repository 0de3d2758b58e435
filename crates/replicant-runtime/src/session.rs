//! [`Session`] – lock-step driver for a scene of replicants.
//!
//! One call to [`Session::communicate`] is one tick:
//!
//! 1. **Collect** – scene instructions queued with [`Session::send`], then
//!    per replicant (in insertion order) its initialization instructions
//!    and the output of its previous tick.
//! 2. **Exchange** – the batch goes through the [`Transport`].
//! 3. **Observe** – the response frames become one shared [`WorldState`].
//! 4. **Advance** – every replicant advances its active action once and
//!    terminal outcomes are recorded as [`ActionEvent`]s.
//!
//! Instructions produced on tick *n* reach the simulator with the exchange
//! of tick *n + 1*.

use replicant_hal::Transport;
use replicant_perception::WorldState;
use replicant_types::{ActionEvent, Instruction, ObjectId, ReplicantError};
use tracing::{debug, instrument, warn};

use crate::replicant::Replicant;

/// A scene's replicants, the latest world snapshot and the event log.
#[derive(Debug, Default)]
pub struct Session {
    agents: Vec<Replicant>,
    pending: Vec<Instruction>,
    world: WorldState,
    tick: u64,
    events: Vec<ActionEvent>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a replicant; its id must be unique within the session.
    pub fn add_replicant(&mut self, replicant: Replicant) -> Result<(), ReplicantError> {
        if self.replicant(replicant.id()).is_some() {
            return Err(ReplicantError::invalid(
                "id",
                format!("replicant {} already exists", replicant.id()),
            ));
        }
        debug!(agent = replicant.id(), "replicant added");
        self.agents.push(replicant);
        Ok(())
    }

    pub fn replicant(&self, id: ObjectId) -> Option<&Replicant> {
        self.agents.iter().find(|a| a.id() == id)
    }

    pub fn replicant_mut(&mut self, id: ObjectId) -> Result<&mut Replicant, ReplicantError> {
        self.agents
            .iter_mut()
            .find(|a| a.id() == id)
            .ok_or(ReplicantError::UnknownAgent(id))
    }

    pub fn replicants(&self) -> impl Iterator<Item = &Replicant> {
        self.agents.iter()
    }

    /// Queue a scene-level instruction for the next round-trip.
    pub fn send(&mut self, instruction: Instruction) {
        self.pending.push(instruction);
    }

    /// The world as of the last round-trip.
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Number of completed round-trips.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// `true` when no replicant has an active action.
    pub fn is_idle(&self) -> bool {
        self.agents.iter().all(Replicant::is_idle)
    }

    /// Outcomes recorded so far, oldest first.
    pub fn events(&self) -> &[ActionEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<ActionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Run one tick.  A transport error leaves every replicant's action
    /// state untouched; the instructions of that batch are lost.
    #[instrument(skip_all, fields(tick = self.tick + 1))]
    pub fn communicate<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<&WorldState, ReplicantError> {
        let mut batch = std::mem::take(&mut self.pending);
        for agent in &mut self.agents {
            batch.extend(agent.initialization_instructions());
            batch.extend(agent.take_outgoing());
        }
        debug!(instructions = batch.len(), "sending batch");

        let frames = transport.communicate(batch).inspect_err(|e| {
            warn!(error = %e, "round-trip failed");
        })?;
        self.tick += 1;
        self.world = WorldState::from_frames(&frames);

        for agent in &mut self.agents {
            agent.on_response(&self.world, self.tick);
            self.events.extend(agent.take_events());
        }
        Ok(&self.world)
    }

    /// Tick until every replicant is idle or `max_ticks` round-trips have
    /// run, then flush the final tick's instructions.  Returns the number
    /// of round-trips made.
    pub fn run_until_idle<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        max_ticks: u64,
    ) -> Result<u64, ReplicantError> {
        let mut ticks = 0;
        while ticks < max_ticks {
            self.communicate(transport)?;
            ticks += 1;
            if self.is_idle() {
                break;
            }
        }
        let unsent = self.agents.iter().any(Replicant::has_outgoing) || !self.pending.is_empty();
        if self.is_idle() && unsent && ticks < max_ticks {
            self.communicate(transport)?;
            ticks += 1;
        }
        if !self.is_idle() {
            warn!(max_ticks, "tick budget exhausted with actions still running");
        }
        Ok(ticks)
    }
}
