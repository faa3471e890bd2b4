// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains helper types for returning velocity commands from control callbacks.

use serde::Deserialize;
use serde::Serialize;

use crate::robot::command_buffer::{Action, GRIPPER_CHANNEL, ROTATION_OFFSET, TRANSLATION_OFFSET};

/// Helper trait for control loops.
///
/// Used to determine whether to terminate a loop after the control callback has returned.
pub trait Finishable {
    /// Determines whether to finish a currently running motion.
    fn is_finished(&self) -> bool;
    /// Sets the attribute which decide if the currently running motion should be finished
    fn set_motion_finished(&mut self, finished: bool);
    /// Helper method to indicate that a motion should stop after processing the given command.
    fn motion_finished(self) -> Self;
}

/// Stores one tick worth of velocity commands in the robot frame.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct VelocityCommand {
    motion_finished: bool,
    /// Desired velocity w.r.t. the robot frame {dx, dy, dz in \[m/s\], roll, pitch, yaw rates}.
    pub twist: [f64; 6],
    /// Gripper actuation. If "None" the gripper channel is left untouched.
    pub gripper: Option<f64>,
    /// Remaining error of the controlled quantity. Used for stall detection.
    pub residual: Option<f64>,
}

impl Default for VelocityCommand {
    fn default() -> Self {
        VelocityCommand::idle()
    }
}

impl VelocityCommand {
    /// Creates a new VelocityCommand instance.
    /// # Arguments
    /// * `linear` - translational velocity in \[m/s\]
    /// * `angular` - rates of the roll, pitch and yaw angles
    pub fn new(linear: [f64; 3], angular: [f64; 3]) -> Self {
        VelocityCommand {
            motion_finished: false,
            twist: [
                linear[0], linear[1], linear[2], angular[0], angular[1], angular[2],
            ],
            gripper: None,
            residual: None,
        }
    }
    /// Translational command without rotation.
    pub fn linear(linear: [f64; 3]) -> Self {
        VelocityCommand::new(linear, [0.; 3])
    }
    /// Rotational command without translation.
    pub fn angular(angular: [f64; 3]) -> Self {
        VelocityCommand::new([0.; 3], angular)
    }
    /// A command that keeps the arm still.
    pub fn idle() -> Self {
        VelocityCommand::new([0.; 3], [0.; 3])
    }
    pub fn with_gripper(mut self, gripper: f64) -> Self {
        self.gripper = Some(gripper);
        self
    }
    pub fn with_residual(mut self, residual: f64) -> Self {
        self.residual = Some(residual);
        self
    }
    /// Determines whether any velocity channel is non-zero.
    pub fn is_moving(&self) -> bool {
        self.twist.iter().any(|value| *value != 0.)
    }
    pub(crate) fn write_into(&self, action: &mut Action) {
        action[TRANSLATION_OFFSET..TRANSLATION_OFFSET + 3].copy_from_slice(&self.twist[0..3]);
        action[ROTATION_OFFSET..ROTATION_OFFSET + 3].copy_from_slice(&self.twist[3..6]);
        if let Some(gripper) = self.gripper {
            action[GRIPPER_CHANNEL] = gripper;
        }
    }
}

impl Finishable for VelocityCommand {
    fn is_finished(&self) -> bool {
        self.motion_finished
    }
    fn set_motion_finished(&mut self, finished: bool) {
        self.motion_finished = finished;
    }
    fn motion_finished(mut self) -> Self {
        self.set_motion_finished(true);
        self
    }
}
