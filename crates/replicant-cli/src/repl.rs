//! REPL – interactive shell driving one replicant inside [`SimWorld`].
//!
//! Every motion command sets the replicant's action and then ticks the
//! session until the action ends, the tick budget runs out or Ctrl-C is
//! pressed.  Positions are world coordinates in metres; angles are degrees.

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use replicant_hal::SimWorld;
use replicant_runtime::{HeadParams, MoveParams, ReachParams, Replicant, Session};
use replicant_types::{
    ActionEvent, ActionStatus, Arm, Axis, DropOffset, Instruction, ObjectId, Pose, Quaternion,
    ReplicantError, Target, Vec3,
};
use tracing::{info, warn};

use crate::config::Config;

/// Id of the shell's replicant.
pub const AGENT: ObjectId = 0;

const DEFAULT_DROP_FRAMES: u32 = 100;

/// One parsed slash-command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    MoveBy(f32),
    MoveTo(Target),
    TurnBy(f32),
    TurnTo(Target),
    ReachFor(Vec<Arm>, Vec3),
    ResetArm(Vec<Arm>),
    Grasp(ObjectId, Arm),
    Drop(Arm),
    LookAt(Target),
    RotateHead(Axis, f32),
    ResetHead,
    Spawn(ObjectId, Vec3),
    Status,
    Collision(String, bool),
    Schema,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line.  Errors are user-facing messages.
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or_else(|| "empty command".to_string())?;
        let args: Vec<&str> = words.collect();

        let command = match name {
            "/move_by" => Command::MoveBy(number(&args, 0, "distance")?),
            "/move_to" => Command::MoveTo(target(&args)?),
            "/turn_by" => Command::TurnBy(number(&args, 0, "angle")?),
            "/turn_to" => Command::TurnTo(target(&args)?),
            "/reach_for" => {
                let arms = arms(args.first().copied().unwrap_or(""))?;
                Command::ReachFor(arms, point(&args[1.min(args.len())..])?)
            }
            "/reset_arm" => Command::ResetArm(arms(args.first().copied().unwrap_or("both"))?),
            "/grasp" => Command::Grasp(object_id(&args, 0)?, arm(&args, 1)?),
            "/drop" => Command::Drop(arm(&args, 0)?),
            "/look_at" => Command::LookAt(target(&args)?),
            "/rotate_head" => {
                let axis = args
                    .first()
                    .ok_or_else(|| "usage: /rotate_head pitch|yaw|roll <degrees>".to_string())?
                    .parse::<Axis>()
                    .map_err(|e| e.to_string())?;
                Command::RotateHead(axis, number(&args, 1, "angle")?)
            }
            "/reset_head" => Command::ResetHead,
            "/spawn" => Command::Spawn(object_id(&args, 0)?, point(&args[1.min(args.len())..])?),
            "/status" => Command::Status,
            "/collision" => {
                let [key, state] = args.as_slice() else {
                    return Err("usage: /collision <key> on|off".to_string());
                };
                let enabled = match *state {
                    "on" => true,
                    "off" => false,
                    other => return Err(format!("expected on|off, got '{other}'")),
                };
                Command::Collision(key.to_string(), enabled)
            }
            "/schema" => Command::Schema,
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            other => return Err(format!("unknown command '{other}'")),
        };
        Ok(command)
    }
}

fn number(args: &[&str], index: usize, name: &str) -> Result<f32, String> {
    let raw = args
        .get(index)
        .ok_or_else(|| format!("missing {name}"))?;
    let value: f32 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a valid {name}"))?;
    if !value.is_finite() {
        return Err(format!("{name} must be finite"));
    }
    Ok(value)
}

fn point(args: &[&str]) -> Result<Vec3, String> {
    if args.len() != 3 {
        return Err("expected x y z".to_string());
    }
    Ok(Vec3::new(
        number(args, 0, "x")?,
        number(args, 1, "y")?,
        number(args, 2, "z")?,
    ))
}

/// `x y z` or a single object id.
fn target(args: &[&str]) -> Result<Target, String> {
    match args {
        [_] => Ok(Target::Object(object_id(args, 0)?)),
        _ => point(args).map(Target::Position),
    }
}

fn object_id(args: &[&str], index: usize) -> Result<ObjectId, String> {
    let raw = args.get(index).ok_or_else(|| "missing object id".to_string())?;
    raw.parse()
        .map_err(|_| format!("'{raw}' is not a valid object id"))
}

fn arm(args: &[&str], index: usize) -> Result<Arm, String> {
    args.get(index)
        .ok_or_else(|| "missing arm (left|right)".to_string())?
        .parse::<Arm>()
        .map_err(|e| e.to_string())
}

fn arms(raw: &str) -> Result<Vec<Arm>, String> {
    match raw {
        "both" => Ok(Arm::BOTH.to_vec()),
        other => other
            .parse::<Arm>()
            .map(|a| vec![a])
            .map_err(|_| "expected left|right|both".to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shell
// ─────────────────────────────────────────────────────────────────────────────

/// The session, simulator and limits behind the prompt.
pub struct Shell {
    session: Session,
    sim: SimWorld,
    max_ticks: u64,
}

impl Shell {
    /// Build the room, spawn the replicant and run the first round-trip.
    pub fn boot(cfg: &Config) -> Result<Self, ReplicantError> {
        let mut replicant = Replicant::new(AGENT, Pose::new(Vec3::zero(), Quaternion::identity()))
            .with_target_framerate(cfg.target_framerate);
        replicant.collision_detection = cfg.collision.clone();

        let mut session = Session::new();
        session.add_replicant(replicant)?;
        let mut sim = SimWorld::builder().room(cfg.room_half_extent).build();
        session.communicate(&mut sim)?;
        info!(room = cfg.room_half_extent, "simulator ready");
        Ok(Self {
            session,
            sim,
            max_ticks: cfg.max_ticks,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sim(&self) -> &SimWorld {
        &self.sim
    }

    fn replicant(&mut self) -> Result<&mut Replicant, ReplicantError> {
        self.session.replicant_mut(AGENT)
    }

    /// Set the action a command names.
    pub fn start(&mut self, command: &Command) -> Result<(), ReplicantError> {
        let r = self.replicant()?;
        match command {
            Command::MoveBy(d) => r.move_by(*d, MoveParams::default()),
            Command::MoveTo(t) => r.move_to(*t, MoveParams::default()),
            Command::TurnBy(a) => r.turn_by(*a, MoveParams::default()),
            Command::TurnTo(t) => r.turn_to(*t, MoveParams::default()),
            Command::ReachFor(arms, p) => r.reach_for(
                arms.iter().map(|a| (*a, *p)),
                ReachParams::default(),
            ),
            Command::ResetArm(arms) => r.reset_arm(arms, 0.25, true),
            Command::Grasp(id, a) => r.grasp(*id, *a, None),
            Command::Drop(a) => r.drop(*a, DropOffset::default(), DEFAULT_DROP_FRAMES),
            Command::LookAt(t) => r.look_at(*t, HeadParams::default()),
            Command::RotateHead(axis, angle) => r.rotate_head(*axis, *angle, HeadParams::default()),
            Command::ResetHead => r.reset_head(HeadParams::default()),
            other => Err(ReplicantError::invalid(
                "command",
                format!("{other:?} does not start an action"),
            )),
        }
    }

    /// Tick until the replicant is idle, the budget is spent or `stop` is
    /// raised.  A stop cancels the action and flushes its halt
    /// instructions.
    pub fn drive(&mut self, stop: &AtomicBool) -> Result<Vec<ActionEvent>, ReplicantError> {
        let mut ticks = 0;
        while !self.session.is_idle() && ticks < self.max_ticks {
            if stop.load(Ordering::SeqCst) {
                self.replicant()?.cancel_action();
                break;
            }
            self.session.communicate(&mut self.sim)?;
            ticks += 1;
        }
        if self.session.is_idle() {
            // Deliver the final tick's end instructions.
            self.session.communicate(&mut self.sim)?;
        } else {
            warn!(ticks, "tick budget exhausted, cancelling");
            self.replicant()?.cancel_action();
            self.session.communicate(&mut self.sim)?;
        }
        Ok(self.session.take_events())
    }

    /// Queue a floor object for the next round-trip and deliver it.
    pub fn spawn(&mut self, id: ObjectId, position: Vec3) -> Result<(), ReplicantError> {
        self.session.send(Instruction::AddObject {
            object_id: id,
            name: format!("object_{id}"),
            position,
            radius: 0.1,
            height: 0.2,
            affordances: Vec::new(),
            inside: None,
        });
        self.session.communicate(&mut self.sim)?;
        Ok(())
    }

    /// Toggle one collision-policy flag.
    pub fn set_collision(&mut self, key: &str, enabled: bool) -> Result<(), ReplicantError> {
        let policy = &mut self.replicant()?.collision_detection;
        let flag = match key {
            "objects" => &mut policy.objects,
            "walls" => &mut policy.walls,
            "avoid_obstacles" => &mut policy.avoid_obstacles,
            "previous_was_same" => &mut policy.previous_was_same,
            other => {
                return Err(ReplicantError::invalid(
                    "key",
                    format!("unknown collision flag '{other}'"),
                ));
            }
        };
        *flag = enabled;
        Ok(())
    }
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration and between ticks.
pub fn run(mut shell: Shell, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "replicant>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match Command::parse(line) {
            Ok(c) => c,
            Err(e) => {
                println!(
                    "{} {}. Type {} for available commands.",
                    "Error:".red(),
                    e,
                    "/help".bold()
                );
                continue;
            }
        };

        match command {
            Command::Help => cmd_help(),
            Command::Quit => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Command::Status => cmd_status(&shell),
            Command::Schema => cmd_schema(),
            Command::Spawn(id, position) => report(shell.spawn(id, position).map(|()| {
                format!("spawned object {} at {}", id, fmt_vec(position))
            })),
            Command::Collision(ref key, enabled) => {
                report(shell.set_collision(key, enabled).map(|()| {
                    format!("{} {}", key, if enabled { "on" } else { "off" })
                }))
            }
            ref action => cmd_action(&mut shell, action, &shutdown),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Replicant Commands".bold().underline());
    let rows = [
        ("/move_by <m>", "drive forward (negative: backward)"),
        ("/move_to <x y z | id>", "turn toward and drive to a target"),
        ("/turn_by <deg>", "turn in place (positive: right)"),
        ("/turn_to <x y z | id>", "face a target"),
        ("/reach_for left|right|both <x y z>", "move hands to a point"),
        ("/reset_arm [left|right|both]", "return hands to neutral"),
        ("/grasp <id> left|right", "pick up an object"),
        ("/drop left|right", "release a held object"),
        ("/look_at <x y z | id>", "point the head at a target"),
        ("/rotate_head pitch|yaw|roll <deg>", "rotate the head"),
        ("/reset_head", "face straight ahead"),
        ("/spawn <id> <x y z>", "add a floor object"),
        ("/status", "pose, hands and last outcome"),
        ("/collision <key> on|off", "objects, walls, avoid_obstacles, previous_was_same"),
        ("/schema", "print the wire JSON schema"),
        ("/quit  /exit", "exit the shell"),
    ];
    for (usage, what) in rows {
        println!("  {:<38} – {}", usage.bold().cyan(), what);
    }
    println!();
}

fn cmd_action(shell: &mut Shell, command: &Command, shutdown: &AtomicBool) {
    if let Err(e) = shell.start(command) {
        println!("{}: {}", "Rejected".red(), e);
        return;
    }
    match shell.drive(shutdown) {
        Ok(events) if events.is_empty() => {
            println!("  {}", "no outcome (cancelled or out of ticks)".yellow());
        }
        Ok(events) => {
            for event in events {
                let status = match event.status {
                    ActionStatus::Success => event.status.to_string().green(),
                    _ => event.status.to_string().red(),
                };
                println!("  {} {} (tick {})", event.action.bold(), status, event.tick);
            }
        }
        Err(e) => println!("{}: {}", "Simulator error".red(), e),
    }
}

fn cmd_status(shell: &Shell) {
    println!("{}", "Replicant".bold().underline());
    println!("  tick      : {}", shell.session().tick());
    let Some(replicant) = shell.session().replicant(AGENT) else {
        println!("  {}", "not spawned".yellow());
        return;
    };
    let pose = replicant.pose();
    println!("  position  : {}", fmt_vec(pose.position));
    println!("  yaw       : {:.1}°", pose.rotation.yaw());
    for arm in Arm::BOTH {
        let held = replicant
            .hands()
            .held(arm)
            .map_or_else(|| "empty".dimmed().to_string(), |id| id.to_string());
        println!("  {:<10}: {}", format!("{arm} hand"), held);
    }
    match replicant.action() {
        Some(action) => println!("  action    : {} {}", action.name().bold(), action.status()),
        None => println!("  action    : {}", "none".dimmed()),
    }
    let policy = &replicant.collision_detection;
    println!(
        "  collision : objects={} walls={} avoid_obstacles={} previous_was_same={}",
        policy.objects, policy.walls, policy.avoid_obstacles, policy.previous_was_same
    );
}

fn cmd_schema() {
    match replicant_runtime::schema::wire_schema()
        .and_then(|s| {
            serde_json::to_string_pretty(&s)
                .map_err(|e| ReplicantError::Serialization(e.to_string()))
        })
    {
        Ok(text) => println!("{text}"),
        Err(e) => println!("{}: {}", "Schema error".red(), e),
    }
}

fn report(result: Result<String, ReplicantError>) {
    match result {
        Ok(msg) => println!("  {} {}", "✓".green(), msg),
        Err(e) => println!("{}: {}", "Error".red(), e),
    }
}

fn fmt_vec(v: Vec3) -> String {
    format!("({:.2}, {:.2}, {:.2})", v.x, v.y, v.z)
}
