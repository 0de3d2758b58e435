//! `replicant-runtime` – the action engine.
//!
//! Drives wheeled humanoid replicants through a simulator one tick at a
//! time.  Callers start high-level actions on a [`Replicant`]; a
//! [`Session`] exchanges one instruction batch per tick with a
//! [`Transport`][replicant_hal::Transport] and advances every replicant's
//! active action against the reported world.
//!
//! # Modules
//!
//! - [`actions`] – [`ActionKind`][actions::ActionKind]: the closed set of
//!   behaviors (locomotion, arm reaches, grasp and drop, head control), each
//!   advanced once per tick through the same `update(ctx, hands) -> Step`
//!   contract.
//! - [`scheduler`] – [`ActionScheduler`][scheduler::ActionScheduler]: one
//!   active action per replicant, replacement and failure carry-over.
//! - [`replicant`] – [`Replicant`][replicant::Replicant]: an agent's intents,
//!   hands, collision policy and per-tick instruction buffers.
//! - [`session`] – [`Session`][session::Session]: lock-step round-trips for
//!   a scene of replicants, with an [`ActionEvent`][replicant_types::ActionEvent]
//!   log of every terminal outcome.
//! - [`schema`] – JSON Schema export of the wire types.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging plus optional OTLP span export.

pub mod actions;
pub mod replicant;
pub mod scheduler;
pub mod schema;
pub mod session;
pub mod telemetry;

pub use actions::{
    Action, ActionKind, ArmTarget, HeadParams, MotionSense, MoveParams, ReachParams, Step,
};
pub use replicant::Replicant;
pub use scheduler::ActionScheduler;
pub use session::Session;
pub use telemetry::{init_tracing, LogFormat, TracerProviderGuard};
