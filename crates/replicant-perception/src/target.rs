//! Target resolution.
//!
//! Actions aim at a [`Target`]: either a live object, whose position is
//! dereferenced from the current [`WorldState`] every tick, or a fixed
//! point.  [`TargetResolver`] turns either into a concrete world-space
//! [`ResolvedTarget`].

use replicant_types::{FailureReason, ObjectId, Pose, Target, Vec3};

use crate::transform::Transform3D;
use crate::world::{WorldState, nearest};

/// A concrete spatial goal for the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTarget {
    pub position: Vec3,
    /// The object the goal is attached to, if any.  Actions exclude it from
    /// collision checks since they approach it deliberately.
    pub anchor: Option<ObjectId>,
}

impl ResolvedTarget {
    pub fn point(position: Vec3) -> Self {
        Self {
            position,
            anchor: None,
        }
    }
}

/// Resolves [`Target`]s against a world snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetResolver;

impl TargetResolver {
    /// Resolve `target` to a world-space point.  Objects resolve to their
    /// current position; positions are used as given.
    ///
    /// Fails with [`FailureReason::UnknownObject`] when the object is not in
    /// the snapshot.
    pub fn resolve(target: &Target, world: &WorldState) -> Result<ResolvedTarget, FailureReason> {
        match target {
            Target::Position(p) => Ok(ResolvedTarget::point(*p)),
            Target::Object(id) => world
                .object(*id)
                .map(|pose| ResolvedTarget {
                    position: pose.position,
                    anchor: Some(*id),
                })
                .ok_or(FailureReason::UnknownObject(*id)),
        }
    }

    /// Resolve a reach target for a hand at `hand`.
    ///
    /// * A position is world-space when `absolute`, otherwise an offset in
    ///   the frame of `agent`.
    /// * An object resolves to its affordance point nearest the hand, then
    ///   its nearest bounds point, then its position.
    pub fn resolve_reach(
        target: &Target,
        world: &WorldState,
        agent: &Pose,
        hand: Vec3,
        absolute: bool,
    ) -> Result<ResolvedTarget, FailureReason> {
        match target {
            Target::Position(p) if absolute => Ok(ResolvedTarget::point(*p)),
            Target::Position(p) => Ok(ResolvedTarget::point(
                Transform3D::from(*agent).transform_point(*p),
            )),
            Target::Object(id) => {
                let base = Self::resolve(target, world)?;
                let position = nearest(world.affordances(*id), hand)
                    .or_else(|| world.bounds(*id).map(|b| b.nearest_to(hand)))
                    .unwrap_or(base.position);
                Ok(ResolvedTarget {
                    position,
                    anchor: Some(*id),
                })
            }
        }
    }
}
