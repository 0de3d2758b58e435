//! [`ActionScheduler`] – at most one active action per replicant.
//!
//! Setting an action replaces the current one unconditionally.  The
//! scheduler remembers how the last action ended so the next one can apply
//! failure carry-over.

use replicant_types::{Instruction, ObjectId};
use tracing::debug;

use crate::actions::{Action, Hands, Predecessor, Step, TickContext};

/// Holds the active action and the most recently ended one.
#[derive(Debug, Default)]
pub struct ActionScheduler {
    active: Option<Action>,
    last: Option<Action>,
    previous: Option<Predecessor>,
}

impl ActionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `action` the active action.  A displaced action that had
    /// started moving yields its end instructions.
    pub fn set_action(&mut self, agent_id: ObjectId, action: Action) -> Vec<Instruction> {
        let mut halt = Vec::new();
        if let Some(displaced) = self.active.take() {
            debug!(agent = agent_id, action = displaced.name(), "action replaced");
            halt = displaced.cancel_instructions(agent_id);
            self.last = Some(displaced);
        }
        self.previous = self.last.as_ref().map(|last| Predecessor {
            sense: last.sense(),
            failure: last.status().failure(),
        });
        self.active = Some(action);
        halt
    }

    /// Advance the active action by one tick.  Returns `None` when idle.
    pub fn advance(&mut self, ctx: &TickContext<'_>, hands: &mut Hands) -> Option<Step> {
        let action = self.active.as_mut()?;
        let ctx = TickContext {
            previous: self.previous,
            ..*ctx
        };
        let step = action.update(&ctx, hands);
        if step.status.is_terminal() {
            self.last = self.active.take();
        }
        Some(step)
    }

    /// Drop the active action without recording a failure.
    pub fn cancel(&mut self, agent_id: ObjectId) -> Vec<Instruction> {
        let Some(action) = self.active.take() else {
            return Vec::new();
        };
        debug!(agent = agent_id, action = action.name(), "action cancelled");
        let halt = action.cancel_instructions(agent_id);
        self.last = Some(action);
        halt
    }

    pub fn active(&self) -> Option<&Action> {
        self.active.as_ref()
    }

    /// The most recently ended or displaced action.
    pub fn last_action(&self) -> Option<&Action> {
        self.last.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Forget the active and last actions.
    pub fn clear(&mut self) {
        self.active = None;
        self.last = None;
        self.previous = None;
    }
}
