//! `replicant-perception` – spatial reasoning for replicant actions.
//!
//! Turns the simulator's per-tick response frames into a queryable picture
//! of the scene and resolves the abstract targets that actions aim at.
//!
//! # Modules
//!
//! - [`transform`] – [`Transform3D`][transform::Transform3D] plus the angle
//!   helpers used for bearings and head look rotations.
//! - [`world`] – [`WorldState`][world::WorldState]: one tick's object poses,
//!   velocities, bounds, affordances, containment, body states, contacts and
//!   obstacles.
//! - [`target`] – [`TargetResolver`][target::TargetResolver]: object id or
//!   point to a concrete world-space goal.

pub mod target;
pub mod transform;
pub mod world;

pub use target::{ResolvedTarget, TargetResolver};
pub use world::WorldState;
