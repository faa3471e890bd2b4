// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the door and button skills of the [`Manipulator`].
use std::time::Duration;

use nalgebra::Vector3;
use serde::Deserialize;
use serde::Serialize;
use tracing::{debug, info};

use crate::exception::ManipulatorResult;
use crate::robot::control_types::VelocityCommand;
use crate::robot::motion_controller::eef_in_robot_frame;
use crate::robot::observation::entity_key;
use crate::robot::resolver::resolve_anchor;
use crate::robot::robot_frame::RobotFrame;
use crate::skills::approach::ApproachDirection;
use crate::skills::Manipulator;
use crate::Finishable;

/// Geometry of one appliance archetype.
///
/// The fixture has to publish `<fixture>_hinge_pos`, `<fixture>_handle_pos`,
/// `<fixture>_door_angle` (in degrees) and `<fixture>_button_pos`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ApplianceGeometry {
    /// Name of the fixture in the observation.
    pub fixture: String,
    /// End-effector orientation for grasping the handle in \[deg\].
    pub handle_orientation: [f64; 3],
    /// Speed of the end effector along the door arc in \[m/s\].
    pub sweep_speed: f64,
    /// The door counts as open above this angle in \[deg\].
    pub open_threshold: f64,
    /// The door counts as closed below this angle in \[deg\].
    pub closed_threshold: f64,
    /// Opening turns the handle clockwise around the hinge when seen from above.
    pub opens_clockwise: bool,
    /// Unit vector pointing out of the front of the appliance, in the robot frame.
    pub front_normal: [f64; 3],
    /// The button is approached up to this distance in front of it in \[m\].
    pub button_front_offset: f64,
    /// End-effector orientation for pressing the button in \[deg\].
    pub press_orientation: [f64; 3],
    /// Speed of the press pulse in \[m/s\].
    pub press_speed: f64,
    /// Duration of the press pulse in \[s\].
    pub press_duration: f64,
}

impl ApplianceGeometry {
    /// The microwave of the thawing scene.
    pub fn microwave() -> Self {
        ApplianceGeometry {
            fixture: "microwave".to_string(),
            handle_orientation: [180., 0., 90.],
            sweep_speed: 0.1,
            open_threshold: 80.,
            closed_threshold: 2.,
            opens_clockwise: true,
            front_normal: [-1., 0., 0.],
            button_front_offset: 0.06,
            press_orientation: [180., 0., 90.],
            press_speed: 0.2,
            press_duration: 0.5,
        }
    }

    fn normal(&self) -> Vector3<f64> {
        Vector3::from_column_slice(&self.front_normal)
    }
}

impl Default for ApplianceGeometry {
    fn default() -> Self {
        ApplianceGeometry::microwave()
    }
}

impl Manipulator {
    fn door_angle(&self) -> ManipulatorResult<f64> {
        let key = entity_key(&self.config.appliance.fixture, "door_angle");
        self.controller.observation().scalar(&key)
    }

    /// Opens the gripper and approaches the handle from the front, then closes on it.
    fn grasp_handle(&mut self) -> ManipulatorResult<bool> {
        let geometry = &self.config.appliance;
        let orientation = geometry.handle_orientation;
        let handle = self
            .controller
            .resolve_anchor(&geometry.fixture, "handle_pos")?;
        if !self.controller.rotate_to(&orientation)? {
            return Ok(false);
        }
        if !self.controller.open_gripper()? {
            return Ok(false);
        }
        if !self.approach_from_direction(&handle, ApproachDirection::Front)? {
            return Ok(false);
        }
        if !self.controller.close_gripper()? {
            return Ok(false);
        }
        self.require_gripping("handle")
    }

    /// Moves the held handle along the door arc until the door angle passes its threshold.
    ///
    /// The hinge and the end effector are read from every observation, the commanded velocity
    /// is the radius vector between them turned by 90° in the horizontal plane.
    fn sweep_door(&mut self, opening: bool) -> ManipulatorResult<bool> {
        let geometry = &self.config.appliance;
        let fixture = geometry.fixture.clone();
        let angle_key = entity_key(&fixture, "door_angle");
        let speed = geometry.sweep_speed;
        let clockwise = geometry.opens_clockwise == opening;
        let threshold = if opening {
            geometry.open_threshold
        } else {
            geometry.closed_threshold
        };
        let name = if opening { "open_door" } else { "close_door" };
        self.controller.run(name, move |observation, _| {
            let angle = observation.scalar(&angle_key)?;
            let passed = if opening {
                angle > threshold
            } else {
                angle < threshold
            };
            if passed {
                return Ok(VelocityCommand::idle().motion_finished());
            }
            let frame = RobotFrame::from_observation(observation)?;
            let hinge = resolve_anchor(observation, &frame, &fixture, "hinge_pos")?;
            let (position, _) = eef_in_robot_frame(observation)?;
            let radius = position - hinge;
            let tangent = if clockwise {
                Vector3::new(radius.y, -radius.x, 0.)
            } else {
                Vector3::new(-radius.y, radius.x, 0.)
            };
            let residual = (threshold - angle).abs();
            let command = match tangent.try_normalize(f64::EPSILON) {
                Some(direction) => VelocityCommand::linear((direction * speed).into()),
                // end effector on the hinge axis
                None => VelocityCommand::idle(),
            };
            Ok(command.with_residual(residual))
        })
    }

    /// Releases whatever is held and backs off along the front normal.
    fn release_and_retreat(&mut self) -> ManipulatorResult<bool> {
        if !self.controller.open_gripper()? {
            return Ok(false);
        }
        let retreat = self.controller.eef_position()?
            + self.config.appliance.normal() * self.config.retreat_distance;
        self.controller.move_to(&retreat)
    }

    /// Opens the appliance door: grasps the handle, pulls it along the door arc until the door
    /// is open, releases it and backs off.
    /// # Errors
    /// * ResolutionFailure if the fixture does not publish its hinge, handle or door angle.
    pub fn open_door(&mut self) -> ManipulatorResult<bool> {
        let angle = self.door_angle()?;
        if angle > self.config.appliance.open_threshold {
            info!(angle, "door is already open");
            return Ok(true);
        }
        info!(angle, "opening door");
        if !self.grasp_handle()? {
            return Ok(false);
        }
        if !self.sweep_door(true)? {
            return Ok(false);
        }
        let opened = self.release_and_retreat()?;
        info!(opened, angle = self.door_angle()?, "open_door done");
        Ok(opened)
    }

    /// Closes the appliance door. The counterpart of [`open_door`](`Self::open_door`).
    /// # Errors
    /// * ResolutionFailure if the fixture does not publish its hinge, handle or door angle.
    pub fn close_door(&mut self) -> ManipulatorResult<bool> {
        let angle = self.door_angle()?;
        if angle < self.config.appliance.closed_threshold {
            info!(angle, "door is already closed");
            return Ok(true);
        }
        info!(angle, "closing door");
        if !self.grasp_handle()? {
            return Ok(false);
        }
        if !self.sweep_door(false)? {
            return Ok(false);
        }
        let closed = self.release_and_retreat()?;
        info!(closed, angle = self.door_angle()?, "close_door done");
        Ok(closed)
    }

    /// Presses the appliance button.
    ///
    /// Approaches a point in front of the button, pushes forward with a timed velocity pulse
    /// and backs off again.
    /// # Errors
    /// * ResolutionFailure if the fixture does not publish its button.
    pub fn press_button(&mut self) -> ManipulatorResult<bool> {
        let geometry = self.config.appliance.clone();
        let button = self
            .controller
            .resolve_anchor(&geometry.fixture, "button_pos")?;
        let normal = geometry.normal();
        info!("pressing button");
        if !self.controller.rotate_to(&geometry.press_orientation)? {
            return Ok(false);
        }
        let start = button + normal * geometry.button_front_offset;
        if !self.approach_from_direction(&start, ApproachDirection::Front)? {
            return Ok(false);
        }
        let pulse = -normal * geometry.press_speed;
        let duration = Duration::from_secs_f64(geometry.press_duration.max(0.));
        if !self.controller.velocity_pulse(&pulse, duration)? {
            return Ok(false);
        }
        let latched = self
            .controller
            .observation()
            .scalar(&entity_key(&geometry.fixture, "button_pressed"))
            .map(|value| value > 0.5)
            .ok();
        debug!(?latched, "button pulse done");
        let retreat =
            start + normal * (self.config.retreat_distance - geometry.button_front_offset);
        self.controller.move_to(&retreat)
    }
}
