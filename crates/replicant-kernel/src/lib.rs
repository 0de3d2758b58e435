//! `replicant-kernel` – rule engines that decide whether motion continues.
//!
//! The kernel does not move anything; it judges.  Actions hand it each
//! tick's feedback and it answers with a verdict.
//!
//! # Modules
//!
//! - [`collision`] – [`CollisionEvaluator`][collision::CollisionEvaluator]:
//!   ordered [`CollisionRule`][collision::CollisionRule]s applied under a
//!   [`CollisionPolicy`][collision::CollisionPolicy]; the first violation
//!   fails the action.
//! - [`motion`] – [`MotionProfile`][motion::MotionProfile]: duration scaling,
//!   frame counts and easing for timed motions.

pub mod collision;
pub mod motion;

pub use collision::{
    CarryOverRule, CollisionCheck, CollisionEvaluator, CollisionPolicy, CollisionRule,
    ObjectContactRule, ObstacleRule, WallContactRule,
};
pub use motion::{Easing, MotionProfile, REFERENCE_TICK_RATE};
