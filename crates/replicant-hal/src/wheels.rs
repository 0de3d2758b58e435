//! Wheel-value derivation for locomotion actions.
//!
//! When an action is not given explicit [`WheelValues`], it asks a
//! [`WheelController`] every tick.  Torque is proportional to what remains
//! of the motion, capped at [`MAX_TORQUE`] and floored so the base never
//! stalls short of a tight threshold.

use replicant_types::WheelValues;

use crate::pid::PidController;

pub const MAX_TORQUE: f32 = 2.5;
const MOVE_GAIN: f32 = 2.5;
const TURN_GAIN: f32 = 0.05;
const MIN_MOVE_TORQUE: f32 = 0.3;
const MIN_TURN_TORQUE: f32 = 0.1;
const DT: f32 = 1.0 / 60.0;

/// Proportional torque controller for the replicant's wheel base.
#[derive(Debug, Clone)]
pub struct WheelController {
    drive: PidController,
    steer: PidController,
}

impl Default for WheelController {
    fn default() -> Self {
        Self::new()
    }
}

impl WheelController {
    pub fn new() -> Self {
        Self {
            drive: PidController::new(MOVE_GAIN, 0.0, 0.0).with_output_limit(MAX_TORQUE),
            steer: PidController::new(TURN_GAIN, 0.0, 0.0).with_output_limit(MAX_TORQUE),
        }
    }

    /// Both wheels driven equally; `remaining` metres along the initial
    /// forward axis (negative when the goal is behind).
    pub fn for_move(&mut self, remaining: f32) -> WheelValues {
        self.drive.set_set_point(remaining);
        let torque = floor(self.drive.update(0.0, DT), remaining, MIN_MOVE_TORQUE);
        WheelValues {
            left_motor_torque: torque,
            right_motor_torque: torque,
            steer_angle: 0.0,
            brake_torque: 0.0,
        }
    }

    /// Wheels driven in opposition; `remaining` degrees of yaw, positive
    /// to the right.
    pub fn for_turn(&mut self, remaining: f32) -> WheelValues {
        self.steer.set_set_point(remaining);
        let torque = floor(self.steer.update(0.0, DT), remaining, MIN_TURN_TORQUE);
        WheelValues {
            left_motor_torque: torque,
            right_motor_torque: -torque,
            steer_angle: 0.0,
            brake_torque: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.drive.reset();
        self.steer.reset();
    }
}

fn floor(torque: f32, remaining: f32, min: f32) -> f32 {
    if remaining == 0.0 {
        0.0
    } else if torque.abs() < min {
        min.copysign(remaining)
    } else {
        torque
    }
}
