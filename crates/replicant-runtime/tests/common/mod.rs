#![allow(dead_code)]

use replicant_hal::{ObjectSpec, Recorder, SimWorld};
use replicant_runtime::{Replicant, Session};
use replicant_types::{ActionEvent, ActionStatus, ObjectId, Pose, Quaternion, Vec3};

pub const AGENT: ObjectId = 0;
pub const MAX_TICKS: u64 = 1200;

/// A 60 Hz room with one replicant at the origin facing +z.
pub fn scene(objects: Vec<ObjectSpec>) -> (Session, Recorder<SimWorld>) {
    let mut builder = SimWorld::builder().room(4.0);
    for spec in objects {
        builder = builder.object(spec);
    }
    let mut session = Session::new();
    session
        .add_replicant(
            Replicant::new(AGENT, Pose::new(Vec3::zero(), Quaternion::identity()))
                .with_target_framerate(60),
        )
        .unwrap();
    let mut sim = Recorder::new(builder.build());
    // Spawn and request outputs before any action starts.
    session.communicate(&mut sim).unwrap();
    (session, sim)
}

/// Run the session until idle and return the single event produced.
pub fn run(session: &mut Session, sim: &mut Recorder<SimWorld>) -> ActionEvent {
    session.run_until_idle(sim, MAX_TICKS).unwrap();
    let mut events = session.take_events();
    assert_eq!(events.len(), 1, "expected one outcome, got {events:?}");
    events.remove(0)
}

pub fn status(session: &mut Session, sim: &mut Recorder<SimWorld>) -> ActionStatus {
    run(session, sim).status
}

pub fn agent(session: &mut Session) -> &mut Replicant {
    session.replicant_mut(AGENT).unwrap()
}
