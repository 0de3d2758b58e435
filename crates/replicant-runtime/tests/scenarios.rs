//! End-to-end behavior of replicant actions against the in-process
//! simulator.

mod common;

use common::{agent, run, scene, status, AGENT, MAX_TICKS};
use replicant_hal::ObjectSpec;
use replicant_runtime::{HeadParams, MoveParams, ReachParams, Replicant};
use replicant_perception::transform::horizontal_distance;
use replicant_types::{
    ActionStatus, Arm, Axis, DropOffset, FailureReason, Instruction, Pose, Quaternion, Vec3,
};

#[test]
fn move_by_stops_within_tolerance() {
    let (mut session, mut sim) = scene(Vec::new());
    agent(&mut session).move_by(1.0, MoveParams::default()).unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);

    let pose = sim.inner().agent_pose(AGENT).unwrap();
    assert!((pose.position.z - 1.0).abs() <= 0.1, "ended at {:?}", pose.position);
    assert!(pose.position.x.abs() < 1e-3);
    assert_eq!(sim.last_batch(), Some(&[Instruction::Brake { id: AGENT }][..]));
}

#[test]
fn move_by_backward_reverses() {
    let (mut session, mut sim) = scene(Vec::new());
    agent(&mut session).move_by(-0.5, MoveParams::default()).unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);
    let z = sim.inner().agent_pose(AGENT).unwrap().position.z;
    assert!((z + 0.5).abs() <= 0.1);
}

#[test]
fn turn_to_faces_the_point_within_one_degree() {
    let (mut session, mut sim) = scene(Vec::new());
    agent(&mut session)
        .turn_to(Vec3::new(1.0, 0.0, 0.0), MoveParams::default())
        .unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);
    let yaw = sim.inner().agent_pose(AGENT).unwrap().rotation.yaw();
    assert!((yaw - 90.0).abs() <= 1.0, "yaw {yaw}");
}

#[test]
fn turn_by_left() {
    let (mut session, mut sim) = scene(Vec::new());
    agent(&mut session).turn_by(-45.0, MoveParams::default()).unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);
    let yaw = sim.inner().agent_pose(AGENT).unwrap().rotation.yaw();
    assert!((yaw + 45.0).abs() <= 1.0, "yaw {yaw}");
}

#[test]
fn move_to_object_stops_short_by_offset() {
    let (mut session, mut sim) = scene(vec![ObjectSpec::new(9, "crate", Vec3::new(2.0, 0.0, 2.0))]);
    let params = MoveParams {
        arrived_offset: 0.5,
        ..MoveParams::default()
    };
    agent(&mut session).move_to(9u32, params).unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);

    let position = sim.inner().agent_pose(AGENT).unwrap().position;
    let gap = horizontal_distance(position, Vec3::new(2.0, 0.0, 2.0));
    assert!((gap - 0.5).abs() < 0.15, "gap {gap}");
}

#[test]
fn obstacle_failure_carries_over_to_the_next_forward_move() {
    let (mut session, mut sim) = scene(vec![
        ObjectSpec::new(7, "box", Vec3::new(0.0, 0.0, 1.5)).radius(0.2),
    ]);
    agent(&mut session).move_by(2.0, MoveParams::default()).unwrap();
    assert_eq!(
        status(&mut session, &mut sim),
        ActionStatus::Failure(FailureReason::ObstacleAvoided)
    );

    let sent_before = sim.batches().len();
    agent(&mut session).move_by(1.0, MoveParams::default()).unwrap();
    assert_eq!(
        status(&mut session, &mut sim),
        ActionStatus::Failure(FailureReason::PreviousFailureCarryOver)
    );
    assert!(
        sim.batches()[sent_before..]
            .iter()
            .flatten()
            .all(|i| !i.is_motion()),
        "carry-over must not move the replicant"
    );

    agent(&mut session).move_by(-0.3, MoveParams::default()).unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);
}

#[test]
fn disabling_obstacle_avoidance_lets_the_base_touch() {
    let (mut session, mut sim) = scene(vec![
        ObjectSpec::new(7, "box", Vec3::new(0.0, 0.0, 1.5)).radius(0.2),
    ]);
    agent(&mut session).collision_detection.avoid_obstacles = false;
    agent(&mut session).move_by(2.0, MoveParams::default()).unwrap();
    assert_eq!(
        status(&mut session, &mut sim),
        ActionStatus::Failure(FailureReason::ObjectCollision)
    );
}

#[test]
fn excluded_objects_never_fail_motion() {
    let (mut session, mut sim) = scene(vec![
        ObjectSpec::new(7, "box", Vec3::new(0.0, 0.0, 1.5)).radius(0.2),
    ]);
    agent(&mut session).collision_detection.exclude_objects.insert(7);
    agent(&mut session).move_by(1.0, MoveParams::default()).unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);
}

#[test]
fn reach_too_far_fails_without_motion() {
    let (mut session, mut sim) = scene(Vec::new());
    let sent_before = sim.batches().len();
    agent(&mut session)
        .reach_for([(Arm::Right, Vec3::new(0.0, 1.0, 3.0))], ReachParams::default())
        .unwrap();
    let event = run(&mut session, &mut sim);
    assert_eq!(event.status, ActionStatus::Failure(FailureReason::TargetTooFar));
    assert_eq!(event.tick, sent_before as u64 + 1);
    assert!(
        sim.batches()[sent_before..]
            .iter()
            .flatten()
            .all(|i| !i.is_motion())
    );
}

#[test]
fn reach_arrives_and_reset_returns_to_neutral() {
    let (mut session, mut sim) = scene(Vec::new());
    let goal = Vec3::new(0.2, 0.95, 0.4);
    agent(&mut session)
        .reach_for([(Arm::Right, goal)], ReachParams::default())
        .unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);
    let hand = sim.inner().hand_position(AGENT, Arm::Right).unwrap();
    assert!(hand.distance(goal) <= 0.09);

    agent(&mut session).reset_arm(&[Arm::Right], 0.25, true).unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);
    let hand = sim.inner().hand_position(AGENT, Arm::Right).unwrap();
    assert!(hand.distance(Vec3::new(0.2, 0.95, 0.1)) <= 0.09);
}

#[test]
fn grasp_fails_only_when_the_hand_is_full() {
    let (mut session, mut sim) = scene(vec![
        ObjectSpec::new(5, "cup", Vec3::new(0.4, 0.0, 0.5)).radius(0.05),
        ObjectSpec::new(6, "plate", Vec3::new(-0.4, 0.0, 0.5)).radius(0.05),
    ]);
    agent(&mut session).grasp(5, Arm::Right, None).unwrap();
    let event = run(&mut session, &mut sim);
    assert_eq!(event.status, ActionStatus::Success);
    assert_eq!(sim.inner().holder(5), Some((AGENT, Arm::Right)));
    assert_eq!(sim.inner().is_kinematic(5), Some(true));

    agent(&mut session).grasp(6, Arm::Right, None).unwrap();
    assert_eq!(
        status(&mut session, &mut sim),
        ActionStatus::Failure(FailureReason::HandOccupied)
    );

    agent(&mut session).grasp(6, Arm::Left, None).unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);
}

#[test]
fn pinned_object_keeps_its_rotation_until_dropped() {
    let (mut session, mut sim) = scene(vec![
        ObjectSpec::new(5, "cup", Vec3::new(0.4, 0.0, 0.5)).radius(0.05),
    ]);
    agent(&mut session)
        .grasp(5, Arm::Right, Some((Axis::Yaw, 90.0, false)))
        .unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);
    agent(&mut session).turn_by(30.0, MoveParams::default()).unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);

    let body = sim.inner().agent_pose(AGENT).unwrap().rotation;
    let cup = sim.inner().object_rotation(5).unwrap();
    let expected = body.mul(Quaternion::from_yaw(90.0));
    assert!(cup.angle_to(expected) < 1.0);
}

#[test]
fn drop_settles_within_the_frame_budget() {
    let (mut session, mut sim) = scene(vec![
        ObjectSpec::new(5, "cup", Vec3::new(0.4, 0.0, 0.5)).radius(0.05),
    ]);
    agent(&mut session).grasp(5, Arm::Right, None).unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);

    let start = session.tick() + 1;
    agent(&mut session)
        .drop(Arm::Right, DropOffset::Forward(0.1), 100)
        .unwrap();
    let event = run(&mut session, &mut sim);
    assert_eq!(event.status, ActionStatus::Success);
    assert!(event.tick <= start + 100);
    assert_eq!(sim.inner().holder(5), None);
    assert_eq!(sim.inner().is_kinematic(5), Some(false));
    assert!(sim.inner().object_position(5).unwrap().y.abs() < 1e-6);
}

#[test]
fn drop_times_out_at_the_frame_budget() {
    let (mut session, mut sim) = scene(vec![
        ObjectSpec::new(5, "cup", Vec3::new(0.4, 0.0, 0.5)).radius(0.05),
    ]);
    agent(&mut session).grasp(5, Arm::Right, None).unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);

    let start = session.tick() + 1;
    agent(&mut session)
        .drop(Arm::Right, DropOffset::Forward(0.1), 5)
        .unwrap();
    let event = run(&mut session, &mut sim);
    assert_eq!(event.status, ActionStatus::Failure(FailureReason::DropTimeout));
    assert_eq!(event.tick, start + 5);
}

#[test]
fn rotate_head_succeeds_with_every_collision_check_enabled() {
    let (mut session, mut sim) = scene(vec![
        ObjectSpec::new(7, "box", Vec3::new(0.0, 0.0, 0.5)).radius(0.3),
    ]);
    agent(&mut session)
        .rotate_head(Axis::Yaw, 45.0, HeadParams::default())
        .unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);
    let head = sim.inner().head_rotation(AGENT).unwrap();
    assert!((head.yaw() - 45.0).abs() <= 0.5);

    agent(&mut session).reset_head(HeadParams::default()).unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);
}

#[test]
fn look_at_turns_the_head_toward_an_object() {
    let (mut session, mut sim) = scene(vec![ObjectSpec::new(3, "lamp", Vec3::new(1.0, 0.0, 1.0))]);
    agent(&mut session)
        .look_at(3u32, HeadParams::default())
        .unwrap();
    assert_eq!(status(&mut session, &mut sim), ActionStatus::Success);
    let head = sim.inner().head_rotation(AGENT).unwrap();
    assert!((head.yaw() - 45.0).abs() <= 1.0);
}

#[test]
fn replicants_advance_in_lock_step() {
    let (mut session, mut sim) = scene(Vec::new());
    session
        .add_replicant(
            Replicant::new(1, Pose::new(Vec3::new(1.5, 0.0, 0.0), Quaternion::identity()))
                .with_target_framerate(60),
        )
        .unwrap();
    agent(&mut session).move_by(0.5, MoveParams::default()).unwrap();
    session
        .replicant_mut(1)
        .unwrap()
        .turn_by(90.0, MoveParams::default())
        .unwrap();

    session.run_until_idle(&mut sim, MAX_TICKS).unwrap();
    let events = session.take_events();
    let mut agents: Vec<_> = events.iter().map(|e| e.agent_id).collect();
    agents.sort_unstable();
    assert_eq!(agents, vec![0, 1]);
    assert!(events.iter().all(|e| e.status == ActionStatus::Success));
}

#[test]
fn reported_framerate_becomes_the_tick_rate() {
    let (mut session, mut sim) = scene(Vec::new());
    session.send(Instruction::SetTargetFramerate { framerate: 30 });
    session.communicate(&mut sim).unwrap();
    assert_eq!(agent(&mut session).tick_rate(), 30.0);
}
