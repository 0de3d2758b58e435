//! [`CollisionEvaluator`] – the per-tick collision rule engine.
//!
//! Every motion action runs its tick's contacts and obstacles through
//! [`CollisionEvaluator::evaluate`] before checking for success.  Registered
//! [`CollisionRule`]s are evaluated in order; the first violation becomes the
//! action's [`FailureReason`].
//!
//! The standard rule order is:
//! 1. [`CarryOverRule`] – the predecessor failed on a collision in the same
//!    direction.
//! 2. [`ObstacleRule`] – a collider lies in the intended path.
//! 3. [`WallContactRule`] – a watched body part touched a wall.
//! 4. [`ObjectContactRule`] – a watched body part touched an object.
//!
//! Colliders in the policy's exclusion set, and the implicitly ignored ids
//! passed with each check (held objects, the action's own target), never
//! trigger rules 2–4.

use std::collections::BTreeSet;

use replicant_perception::world::{Contact, Obstacle};
use replicant_types::{BodyPart, Collider, ColliderKind, FailureReason, ObjectId, PathRegion};
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// CollisionPolicy
// ────────────────────────────────────────────────────────────────────────────

/// Which collision categories abort motion.  Read-only during a tick; the
/// caller may change it between ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionPolicy {
    /// Fail on contact with objects.
    pub objects: bool,
    /// Fail on contact with walls.
    pub walls: bool,
    /// Fail when an obstacle is detected in the intended path.
    pub avoid_obstacles: bool,
    /// Fail immediately when the previous action failed on a collision in
    /// the same direction.
    pub previous_was_same: bool,
    /// Collider ids that never trigger a failure.
    pub exclude_objects: BTreeSet<ObjectId>,
}

impl Default for CollisionPolicy {
    fn default() -> Self {
        Self {
            objects: true,
            walls: true,
            avoid_obstacles: true,
            previous_was_same: true,
            exclude_objects: BTreeSet::new(),
        }
    }
}

impl CollisionPolicy {
    /// A policy that never fails an action.
    pub fn disabled() -> Self {
        Self {
            objects: false,
            walls: false,
            avoid_obstacles: false,
            previous_was_same: false,
            exclude_objects: BTreeSet::new(),
        }
    }

    pub fn is_excluded(&self, collider: &Collider) -> bool {
        self.exclude_objects.contains(&collider.id)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CollisionCheck
// ────────────────────────────────────────────────────────────────────────────

/// The feedback an action hands to the evaluator on one tick.
#[derive(Debug, Clone, Copy)]
pub struct CollisionCheck<'a> {
    /// The predecessor failed on a collision and moved in the same sense.
    pub previous_same_failed: bool,
    /// Path regions the action moves through; obstacles elsewhere are
    /// ignored.
    pub regions: &'a [PathRegion],
    /// Body parts whose contacts count.  `None` watches every part.
    pub parts: Option<&'a [BodyPart]>,
    pub obstacles: &'a [Obstacle],
    pub contacts: &'a [Contact],
    /// Ids excluded for this check only.
    pub ignored: &'a BTreeSet<ObjectId>,
}

impl CollisionCheck<'_> {
    fn is_ignored(&self, policy: &CollisionPolicy, collider: &Collider) -> bool {
        policy.is_excluded(collider) || self.ignored.contains(&collider.id)
    }

    fn watches(&self, part: &BodyPart) -> bool {
        self.parts.is_none_or(|parts| parts.contains(part))
    }

    fn first_contact(&self, policy: &CollisionPolicy, kind: ColliderKind) -> Option<&Contact> {
        self.contacts.iter().find(|c| {
            c.collider.kind == kind && self.watches(&c.part) && !self.is_ignored(policy, &c.collider)
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single collision condition that fails an action.
///
/// Implement this trait to add custom conditions to a [`CollisionEvaluator`]
/// via [`CollisionEvaluator::add_rule`].
pub trait CollisionRule: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &str;

    /// Return `Ok(())` when the tick is clear, or the failure it causes.
    fn check(&self, policy: &CollisionPolicy, input: &CollisionCheck<'_>)
    -> Result<(), FailureReason>;
}

// ────────────────────────────────────────────────────────────────────────────
// CollisionEvaluator
// ────────────────────────────────────────────────────────────────────────────

/// Ordered list of [`CollisionRule`]s; the first violation wins.
///
/// # Example
///
/// ```
/// use std::collections::BTreeSet;
/// use replicant_kernel::collision::{CollisionCheck, CollisionEvaluator, CollisionPolicy};
/// use replicant_perception::world::Contact;
/// use replicant_types::{BodyPart, Collider, FailureReason, PathRegion};
///
/// let evaluator = CollisionEvaluator::standard();
/// let contacts = [Contact { part: BodyPart::Base, collider: Collider::wall(9000) }];
/// let ignored = BTreeSet::new();
/// let check = CollisionCheck {
///     previous_same_failed: false,
///     regions: &[PathRegion::Forward],
///     parts: None,
///     obstacles: &[],
///     contacts: &contacts,
///     ignored: &ignored,
/// };
///
/// let policy = CollisionPolicy::default();
/// assert_eq!(evaluator.evaluate(&policy, &check), Err(FailureReason::WallCollision));
/// assert!(evaluator.evaluate(&CollisionPolicy::disabled(), &check).is_ok());
/// ```
#[derive(Default)]
pub struct CollisionEvaluator {
    rules: Vec<Box<dyn CollisionRule>>,
}

impl CollisionEvaluator {
    /// An evaluator with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// The four built-in rules in their standard order.
    pub fn standard() -> Self {
        let mut evaluator = Self::new();
        evaluator.add_rule(Box::new(CarryOverRule));
        evaluator.add_rule(Box::new(ObstacleRule));
        evaluator.add_rule(Box::new(WallContactRule));
        evaluator.add_rule(Box::new(ObjectContactRule));
        evaluator
    }

    /// Register a new [`CollisionRule`].  Rules are evaluated in insertion
    /// order.
    pub fn add_rule(&mut self, rule: Box<dyn CollisionRule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Evaluate every rule; returns the first failure encountered.
    pub fn evaluate(
        &self,
        policy: &CollisionPolicy,
        input: &CollisionCheck<'_>,
    ) -> Result<(), FailureReason> {
        for rule in &self.rules {
            if let Err(reason) = rule.check(policy, input) {
                tracing::debug!(rule = rule.name(), %reason, "collision rule violated");
                return Err(reason);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for CollisionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionEvaluator")
            .field("rules", &self.rule_names())
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Fails when `previous_was_same` is set and the predecessor failed on a
/// collision while moving in the same sense.
pub struct CarryOverRule;

impl CollisionRule for CarryOverRule {
    fn name(&self) -> &str {
        "carry_over"
    }

    fn check(
        &self,
        policy: &CollisionPolicy,
        input: &CollisionCheck<'_>,
    ) -> Result<(), FailureReason> {
        if policy.previous_was_same && input.previous_same_failed {
            return Err(FailureReason::PreviousFailureCarryOver);
        }
        Ok(())
    }
}

/// Fails when a non-excluded collider lies in one of the action's path
/// regions.
pub struct ObstacleRule;

impl CollisionRule for ObstacleRule {
    fn name(&self) -> &str {
        "obstacle"
    }

    fn check(
        &self,
        policy: &CollisionPolicy,
        input: &CollisionCheck<'_>,
    ) -> Result<(), FailureReason> {
        if !policy.avoid_obstacles {
            return Ok(());
        }
        let blocked = input.obstacles.iter().any(|o| {
            input.regions.contains(&o.region) && !input.is_ignored(policy, &o.collider)
        });
        if blocked {
            return Err(FailureReason::ObstacleAvoided);
        }
        Ok(())
    }
}

/// Fails on a wall contact when `walls` is set.
pub struct WallContactRule;

impl CollisionRule for WallContactRule {
    fn name(&self) -> &str {
        "wall_contact"
    }

    fn check(
        &self,
        policy: &CollisionPolicy,
        input: &CollisionCheck<'_>,
    ) -> Result<(), FailureReason> {
        if policy.walls && input.first_contact(policy, ColliderKind::Wall).is_some() {
            return Err(FailureReason::WallCollision);
        }
        Ok(())
    }
}

/// Fails on an object contact when `objects` is set.
pub struct ObjectContactRule;

impl CollisionRule for ObjectContactRule {
    fn name(&self) -> &str {
        "object_contact"
    }

    fn check(
        &self,
        policy: &CollisionPolicy,
        input: &CollisionCheck<'_>,
    ) -> Result<(), FailureReason> {
        if policy.objects && input.first_contact(policy, ColliderKind::Object).is_some() {
            return Err(FailureReason::ObjectCollision);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replicant_types::Arm;

    // ------------------------------------------------------------------ helpers
    struct Fixture {
        obstacles: Vec<Obstacle>,
        contacts: Vec<Contact>,
        ignored: BTreeSet<ObjectId>,
        previous_same_failed: bool,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                obstacles: Vec::new(),
                contacts: Vec::new(),
                ignored: BTreeSet::new(),
                previous_same_failed: false,
            }
        }

        fn contact(mut self, part: BodyPart, collider: Collider) -> Self {
            self.contacts.push(Contact { part, collider });
            self
        }

        fn obstacle(mut self, region: PathRegion, collider: Collider) -> Self {
            self.obstacles.push(Obstacle { region, collider });
            self
        }

        fn run(&self, policy: &CollisionPolicy, parts: Option<&[BodyPart]>) -> Result<(), FailureReason> {
            let check = CollisionCheck {
                previous_same_failed: self.previous_same_failed,
                regions: &[PathRegion::Forward],
                parts,
                obstacles: &self.obstacles,
                contacts: &self.contacts,
                ignored: &self.ignored,
            };
            CollisionEvaluator::standard().evaluate(policy, &check)
        }
    }

    // ------------------------------------------------------------------ rules

    #[test]
    fn clear_tick_passes() {
        assert!(Fixture::new().run(&CollisionPolicy::default(), None).is_ok());
    }

    #[test]
    fn object_contact_fails_when_enabled() {
        let f = Fixture::new().contact(BodyPart::Base, Collider::object(3));
        assert_eq!(
            f.run(&CollisionPolicy::default(), None),
            Err(FailureReason::ObjectCollision)
        );
        let policy = CollisionPolicy {
            objects: false,
            ..CollisionPolicy::default()
        };
        assert!(f.run(&policy, None).is_ok());
    }

    #[test]
    fn excluded_colliders_never_fail() {
        let f = Fixture::new()
            .contact(BodyPart::Base, Collider::wall(9001))
            .obstacle(PathRegion::Forward, Collider::wall(9001));
        let mut policy = CollisionPolicy::default();
        policy.exclude_objects.insert(9001);
        assert!(f.run(&policy, None).is_ok());
    }

    #[test]
    fn implicitly_ignored_ids_never_fail() {
        let mut f = Fixture::new().contact(BodyPart::Arm(Arm::Right), Collider::object(8));
        f.ignored.insert(8);
        assert!(f.run(&CollisionPolicy::default(), None).is_ok());
    }

    #[test]
    fn obstacle_wins_over_contact() {
        let f = Fixture::new()
            .contact(BodyPart::Base, Collider::wall(9000))
            .obstacle(PathRegion::Forward, Collider::object(2));
        assert_eq!(
            f.run(&CollisionPolicy::default(), None),
            Err(FailureReason::ObstacleAvoided)
        );
    }

    #[test]
    fn obstacles_outside_the_path_are_ignored() {
        let f = Fixture::new().obstacle(PathRegion::Backward, Collider::object(2));
        assert!(f.run(&CollisionPolicy::default(), None).is_ok());
    }

    #[test]
    fn carry_over_fires_first_and_only_with_flag() {
        let mut f = Fixture::new().obstacle(PathRegion::Forward, Collider::object(2));
        f.previous_same_failed = true;
        assert_eq!(
            f.run(&CollisionPolicy::default(), None),
            Err(FailureReason::PreviousFailureCarryOver)
        );
        let policy = CollisionPolicy {
            previous_was_same: false,
            avoid_obstacles: false,
            ..CollisionPolicy::default()
        };
        assert!(f.run(&policy, None).is_ok());
    }

    #[test]
    fn part_filter_restricts_contacts() {
        let f = Fixture::new().contact(BodyPart::Arm(Arm::Left), Collider::object(4));
        let right_only = [BodyPart::Arm(Arm::Right)];
        assert!(f.run(&CollisionPolicy::default(), Some(&right_only)).is_ok());
        let left_only = [BodyPart::Arm(Arm::Left)];
        assert_eq!(
            f.run(&CollisionPolicy::default(), Some(&left_only)),
            Err(FailureReason::ObjectCollision)
        );
    }

    // ------------------------------------------------------------------ evaluator

    #[test]
    fn empty_evaluator_always_passes() {
        let f = Fixture::new().contact(BodyPart::Base, Collider::wall(9000));
        let check = CollisionCheck {
            previous_same_failed: true,
            regions: &[],
            parts: None,
            obstacles: &f.obstacles,
            contacts: &f.contacts,
            ignored: &f.ignored,
        };
        assert!(CollisionEvaluator::new()
            .evaluate(&CollisionPolicy::default(), &check)
            .is_ok());
    }

    #[test]
    fn standard_rule_order() {
        assert_eq!(
            CollisionEvaluator::standard().rule_names(),
            vec!["carry_over", "obstacle", "wall_contact", "object_contact"]
        );
    }

    #[test]
    fn policy_deserialises_with_defaults() {
        let policy: CollisionPolicy = toml::from_str("walls = false").unwrap();
        assert!(!policy.walls);
        assert!(policy.objects);
        assert!(policy.exclude_objects.is_empty());
    }
}
