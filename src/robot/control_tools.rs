// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Speed tiers and convergence helpers used by the primitive control loops.
use nalgebra::Vector3;

use crate::robot::motion_config::MotionConfig;

/// Maps a magnitude to one of {fast, slow, zero}.
///
/// Strict comparisons: a magnitude exactly on a threshold gets the lower tier, so a routine
/// cannot keep switching at the boundary.
pub fn speed_tier(magnitude: f64, fast_above: f64, slow_above: f64, fast: f64, slow: f64) -> f64 {
    if magnitude > fast_above {
        fast
    } else if magnitude > slow_above {
        slow
    } else {
        0.
    }
}

/// Tiered translational velocity pointing along `error`.
pub fn tiered_translation(error: &Vector3<f64>, config: &MotionConfig) -> Vector3<f64> {
    let distance = error.norm();
    let speed = speed_tier(
        distance,
        config.slow_down_distance,
        config.stop_distance,
        config.max_velocity,
        config.min_velocity,
    );
    if speed == 0. {
        return Vector3::zeros();
    }
    error / distance * speed
}

/// Tiered rotational rate with the sign of `error_deg`.
pub fn tiered_angular_rate(error_deg: f64, config: &MotionConfig) -> f64 {
    speed_tier(
        error_deg.abs(),
        config.fast_angle,
        config.slow_angle,
        config.max_angle_velocity,
        config.min_angle_velocity,
    )
    .copysign(error_deg)
}

/// Clips `value` to \[-limit, limit\].
pub fn clip(value: f64, limit: f64) -> f64 {
    value.max(-limit).min(limit)
}

/// Detects control loops whose residual stopped shrinking.
#[derive(Debug, Clone)]
pub struct StallDetector {
    best: f64,
    ticks_since_progress: usize,
    window: usize,
    min_progress: f64,
}

impl StallDetector {
    pub fn new(window: usize, min_progress: f64) -> Self {
        StallDetector {
            best: f64::INFINITY,
            ticks_since_progress: 0,
            window,
            min_progress,
        }
    }

    /// Feeds the residual of the current tick. Returns true once the loop is considered stalled.
    pub fn update(&mut self, residual: f64) -> bool {
        if residual < self.best - self.min_progress {
            self.best = residual;
            self.ticks_since_progress = 0;
            return false;
        }
        self.ticks_since_progress += 1;
        self.window > 0 && self.ticks_since_progress >= self.window
    }
}
