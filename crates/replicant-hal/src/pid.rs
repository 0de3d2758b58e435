//! PID (Proportional–Integral–Derivative) controller.
//!
//! Used by [`WheelController`][crate::wheels::WheelController] to turn a
//! remaining distance or angle into a bounded motor torque.  The caller
//! supplies the measurement and elapsed time and receives the clamped
//! output.
//!
//! # Example
//!
//! ```rust
//! use replicant_hal::pid::PidController;
//!
//! // Remaining distance 2 m, torque capped at 2.5.
//! let mut pid = PidController::new(2.5, 0.0, 0.0).with_output_limit(2.5);
//! pid.set_set_point(2.0);
//! let torque = pid.update(0.0, 1.0 / 60.0);
//! assert_eq!(torque, 2.5);
//! ```

#[derive(Debug, Clone)]
pub struct PidController {
    kp: f32,
    ki: f32,
    kd: f32,
    set_point: f32,
    integral: f32,
    last_error: Option<f32>,
    output_min: f32,
    output_max: f32,
}

impl PidController {
    /// Create a controller with the given gains and an unclamped output.
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            set_point: 0.0,
            integral: 0.0,
            last_error: None,
            output_min: f32::NEG_INFINITY,
            output_max: f32::INFINITY,
        }
    }

    /// Clamp the output (and the integral term) to `[-limit, limit]`.
    pub fn with_output_limit(mut self, limit: f32) -> Self {
        self.output_min = -limit.abs();
        self.output_max = limit.abs();
        self
    }

    pub fn set_set_point(&mut self, set_point: f32) {
        self.set_point = set_point;
    }

    /// Compute the next output for `measurement` after `dt` seconds.
    /// Returns `0.0` without touching internal state if `dt` is not
    /// positive.
    pub fn update(&mut self, measurement: f32, dt: f32) -> f32 {
        if dt <= 0.0 {
            return 0.0;
        }

        let error = self.set_point - measurement;
        let p = self.kp * error;

        self.integral += error * dt;
        let i = (self.ki * self.integral).clamp(self.output_min, self.output_max);
        if self.ki.abs() > f32::EPSILON {
            self.integral = i / self.ki;
        }

        let d = match self.last_error {
            Some(prev) => self.kd * (error - prev) / dt,
            None => 0.0,
        };
        self.last_error = Some(error);

        (p + i + d).clamp(self.output_min, self.output_max)
    }

    /// Forget the integral accumulator and derivative memory.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
    }
}
