//! `replicant-hal` – the boundary between the action engine and a simulator.
//!
//! # Modules
//!
//! - [`transport`] – [`Transport`][transport::Transport]: one instruction
//!   batch in, one tick of response frames out.
//! - [`pid`] – [`PidController`][pid::PidController]: bounded feedback
//!   controller.
//! - [`wheels`] – [`WheelController`][wheels::WheelController]: derives
//!   per-tick [`WheelValues`][replicant_types::WheelValues] from the
//!   remaining distance or angle.
//! - [`sim`] – [`SimWorld`][sim::SimWorld]: deterministic in-process
//!   simulator for headless tests and the CLI.

pub mod pid;
pub mod sim;
pub mod transport;
pub mod wheels;

pub use sim::{ObjectSpec, SimWorld};
pub use transport::{Recorder, Transport};
pub use wheels::WheelController;
