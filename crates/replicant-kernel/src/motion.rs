//! [`MotionProfile`] – duration, frame count and easing of a timed motion.
//!
//! Durations are authored against a reference tick rate of 60 Hz.  When
//! `scale_duration` is set the duration is multiplied by
//! `tick_rate / 60` once, at construction, so every later frame computation
//! works on the already-scaled value.

use replicant_types::ReplicantError;
use serde::{Deserialize, Serialize};

/// The tick rate durations are authored against.
pub const REFERENCE_TICK_RATE: f32 = 60.0;

/// Interpolation curve applied to linear progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    #[default]
    EaseInOut,
}

impl Easing {
    /// Map linear progress `t` (clamped to `[0, 1]`) onto the curve.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseInOut => t * t * (3.0 - 2.0 * t),
        }
    }
}

/// Scale `duration` by `tick_rate / 60` when `scale` is set.
pub fn scaled_duration(duration: f32, scale: bool, tick_rate: f32) -> f32 {
    if scale {
        duration * tick_rate / REFERENCE_TICK_RATE
    } else {
        duration
    }
}

/// Reject negative or non-finite thresholds.
pub fn validate_threshold(name: &str, value: f32) -> Result<f32, ReplicantError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ReplicantError::invalid(
            name,
            format!("must be a non-negative number, got {value}"),
        ));
    }
    Ok(value)
}

/// Timing of an interpolated motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionProfile {
    duration: f32,
    num_frames: u32,
    easing: Easing,
}

impl MotionProfile {
    /// Build a profile.  Fails when the (scaled) duration is not a positive
    /// finite number.
    pub fn new(
        duration: f32,
        scale_duration: bool,
        tick_rate: f32,
        easing: Easing,
    ) -> Result<Self, ReplicantError> {
        if scale_duration && !(tick_rate.is_finite() && tick_rate > 0.0) {
            return Err(ReplicantError::invalid(
                "tick_rate",
                format!("must be positive, got {tick_rate}"),
            ));
        }
        let duration = scaled_duration(duration, scale_duration, tick_rate);
        if !duration.is_finite() || duration <= 0.0 {
            return Err(ReplicantError::invalid(
                "duration",
                format!("must be positive, got {duration}"),
            ));
        }
        let num_frames = ((duration * REFERENCE_TICK_RATE).ceil() as u32).max(1);
        Ok(Self {
            duration,
            num_frames,
            easing,
        })
    }

    /// The scaled duration in seconds.
    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Number of ticks the motion spans; at least one.
    pub fn num_frames(&self) -> u32 {
        self.num_frames
    }

    pub fn easing(&self) -> Easing {
        self.easing
    }

    /// Eased progress in `[0, 1]` after `frame` ticks.
    pub fn progress(&self, frame: u32) -> f32 {
        self.easing
            .apply(frame as f32 / self.num_frames as f32)
    }

    /// `true` once `frame` has reached the final tick.
    pub fn is_complete(&self, frame: u32) -> bool {
        frame >= self.num_frames
    }
}
