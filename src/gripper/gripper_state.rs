// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the GripperState type.
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::exception::ManipulatorResult;
use crate::robot::motion_config::MotionConfig;
use crate::robot::observation::Observation;

/// Coarse classification of the fingers.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GripperStatus {
    /// Both fingers passed the open threshold.
    Open,
    /// The fingers touch each other.
    Closed,
    /// The fingers are commanded to close but rest on something between them.
    Gripping,
    /// At least one finger is still moving.
    Moving,
    /// Resting somewhere between open and closed without a close command.
    Partial,
}

impl fmt::Display for GripperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GripperStatus::Open => "open",
            GripperStatus::Closed => "closed",
            GripperStatus::Gripping => "gripping",
            GripperStatus::Moving => "moving",
            GripperStatus::Partial => "partially open",
        };
        write!(f, "{}", text)
    }
}

/// Describes the gripper state.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct GripperState {
    /// Finger joint positions. Unit: \[m\].
    pub finger_positions: [f64; 2],
    /// Finger joint velocities. Unit: \[m/s\].
    pub finger_velocities: [f64; 2],
    /// Distance between the fingers. Unit: \[m\].
    pub width: f64,
    /// Value of the gripper channel of the command buffer.
    pub command: f64,
    pub status: GripperStatus,
    /// Simulated time of the observation. Unit: \[s\].
    pub time: f64,
}

impl GripperState {
    /// Classifies the fingers of an observation.
    /// # Errors
    /// * ResolutionFailure if the observation lacks the finger joint state.
    pub fn from_observation(
        observation: &Observation,
        command: f64,
        config: &MotionConfig,
    ) -> ManipulatorResult<Self> {
        let finger_positions = observation.gripper_qpos()?;
        let finger_velocities = observation.gripper_qvel()?;
        let width = finger_positions[0] - finger_positions[1];
        let moving = finger_velocities
            .iter()
            .any(|velocity| velocity.abs() > config.gripper_velocity_threshold);
        let open = finger_positions[0] >= config.gripper_open_threshold
            && finger_positions[1] <= -config.gripper_open_threshold;
        let status = if moving {
            GripperStatus::Moving
        } else if width < config.gripper_closed_width {
            GripperStatus::Closed
        } else if open {
            GripperStatus::Open
        } else if command > 0. {
            GripperStatus::Gripping
        } else {
            GripperStatus::Partial
        };
        Ok(GripperState {
            finger_positions,
            finger_velocities,
            width,
            command,
            status,
            time: observation.time,
        })
    }
}
