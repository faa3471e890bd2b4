// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the [`Manipulator`] type which composes the primitive routines of the
//! [`MotionController`] into manipulation skills.
//!
//! Every skill is a fixed sequence of primitives. The first primitive that returns false ends
//! the skill, which then returns false as well. Nothing that already happened is undone.
use nalgebra::Vector3;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use crate::config::ManipulatorConfig;
use crate::exception::ManipulatorResult;
use crate::gripper::gripper_state::GripperStatus;
use crate::robot::motion_config::MotionConfig;
use crate::robot::motion_controller::MotionController;
use crate::simulation::SimulationHandle;

pub mod appliance;
pub mod approach;

use appliance::ApplianceGeometry;
use approach::{approach_waypoints, ApproachDirection};

/// Fixed orientations and offsets of the skills.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SkillConfig {
    /// Orientation with the fingers pointing down, as extrinsic x-y-z Euler angles in \[deg\].
    pub top_down: [f64; 3],
    /// Height above a target from which the end effector descends in \[m\].
    pub hover_height: f64,
    /// Added to the object height when grasping from above in \[m\].
    pub grasp_height_offset: f64,
    /// Distance the end effector backs off after releasing something in \[m\].
    pub retreat_distance: f64,
    pub appliance: ApplianceGeometry,
}

impl Default for SkillConfig {
    fn default() -> Self {
        SkillConfig {
            top_down: [180., 0., 90.],
            hover_height: 0.1,
            grasp_height_offset: 0.,
            retreat_distance: 0.1,
            appliance: ApplianceGeometry::microwave(),
        }
    }
}

/// Where a held object is released relative to its destination.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Default)]
#[serde(default)]
pub struct PlacementOffsets {
    /// Release height above the destination in \[m\].
    pub height_offset: f64,
    /// Distance in front of the destination in \[m\]. Positive values approach from the front,
    /// everything else from above.
    pub front_offset: f64,
}

/// Runs manipulation skills on a running simulation.
pub struct Manipulator {
    controller: MotionController,
    config: SkillConfig,
}

impl Manipulator {
    pub fn new(handle: SimulationHandle, motion: MotionConfig, config: SkillConfig) -> Self {
        Manipulator {
            controller: MotionController::new(handle, motion),
            config,
        }
    }

    pub fn from_config(handle: SimulationHandle, config: &ManipulatorConfig) -> Self {
        Manipulator::new(handle, config.motion, config.skills.clone())
    }

    pub fn controller(&self) -> &MotionController {
        &self.controller
    }

    /// Gives access to the primitive routines.
    pub fn controller_mut(&mut self) -> &mut MotionController {
        &mut self.controller
    }

    pub fn config(&self) -> &SkillConfig {
        &self.config
    }

    /// Value of the success predicate after the last simulation step.
    pub fn task_succeeded(&self) -> bool {
        self.controller.handle().task_succeeded()
    }

    /// Moves onto `destination` in two straight lines, see [`approach_waypoints`].
    pub fn approach_from_direction(
        &mut self,
        destination: &Vector3<f64>,
        direction: ApproachDirection,
    ) -> ManipulatorResult<bool> {
        let current = self.controller.eef_position()?;
        info!(%direction, "approaching");
        for waypoint in approach_waypoints(&current, destination, direction).iter() {
            if !self.controller.move_to(waypoint)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Grips a named object from above.
    ///
    /// Turns the fingers down, opens, hovers above the object, descends onto it and closes.
    /// # Errors
    /// * ResolutionFailure if the object is not part of the scene.
    /// # Return
    /// True if the gripper holds something afterwards.
    pub fn grip_object_from_above(&mut self, name: &str) -> ManipulatorResult<bool> {
        let object = self.controller.resolve(name)?;
        info!(object = name, "gripping from above");
        let top_down = self.config.top_down;
        if !self.controller.rotate_to(&top_down)? {
            return Ok(false);
        }
        if !self.controller.open_gripper()? {
            return Ok(false);
        }
        let hover = object.position + Vector3::z() * self.config.hover_height;
        if !self.approach_from_direction(&hover, ApproachDirection::Up)? {
            return Ok(false);
        }
        let grasp = object.position + Vector3::z() * self.config.grasp_height_offset;
        if !self.controller.move_to(&grasp)? {
            return Ok(false);
        }
        if !self.controller.close_gripper()? {
            return Ok(false);
        }
        self.require_gripping(name)
    }

    /// Turns the end effector about the vertical axis to the yaw of a named object modulo 90°
    /// plus `offset` in \[deg\]. Roll and pitch are kept.
    pub fn match_orientation(&mut self, name: &str, offset: f64) -> ManipulatorResult<bool> {
        let yaw = self.controller.resolve(name)?.euler().z.rem_euclid(90.) + offset;
        let current = self.controller.eef_euler()?;
        info!(object = name, yaw, "matching orientation");
        self.controller.rotate_axis(&[current.x, current.y, yaw], 2)
    }

    /// Releases a held object.
    ///
    /// Without a destination the object is lowered until it rests on something and released.
    /// With a destination the end effector lifts to hover height, approaches the destination
    /// shifted by `offsets`, releases the object and backs off the way it came.
    /// # Errors
    /// * ResolutionFailure if the object or the destination are not part of the scene.
    pub fn place_object_at_destination(
        &mut self,
        name: &str,
        destination: Option<&str>,
        offsets: PlacementOffsets,
    ) -> ManipulatorResult<bool> {
        self.controller.resolve(name)?;
        let destination = match destination {
            Some(destination) => destination,
            None => {
                info!(object = name, "placing below the gripper");
                if !self.controller.lower_until_settled(name)? {
                    return Ok(false);
                }
                return self.controller.open_gripper();
            }
        };
        let anchor = self.controller.resolve(destination)?.position;
        let target = anchor + Vector3::new(-offsets.front_offset, 0., offsets.height_offset);
        let direction = if offsets.front_offset > 0. {
            ApproachDirection::Front
        } else {
            ApproachDirection::Up
        };
        info!(object = name, destination, %direction, "placing");

        let mut lifted = self.controller.eef_position()?;
        let hover_height = target.z + self.config.hover_height;
        if lifted.z < hover_height {
            lifted.z = hover_height;
            if !self.controller.move_to(&lifted)? {
                return Ok(false);
            }
        }
        if !self.approach_from_direction(&target, direction)? {
            return Ok(false);
        }
        if !self.controller.open_gripper()? {
            return Ok(false);
        }
        let retreat = match direction {
            ApproachDirection::Front => target - Vector3::x() * self.config.retreat_distance,
            _ => target + Vector3::z() * self.config.hover_height,
        };
        self.controller.move_to(&retreat)
    }

    pub(crate) fn require_gripping(&mut self, name: &str) -> ManipulatorResult<bool> {
        let state = self.controller.gripper_state()?;
        if state.status != GripperStatus::Gripping {
            return self.controller.fail(format!(
                "{}: gripper is {} after closing",
                name, state.status
            ));
        }
        Ok(true)
    }
}
