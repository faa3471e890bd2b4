// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//!  Contains the gripper routines of the [`MotionController`].
//!
//! The gripper channel is not zeroed when a routine returns: a closed gripper keeps squeezing
//! and an open one stays open until the next gripper routine.
use tracing::info;

use crate::exception::ManipulatorResult;
use crate::gripper::gripper_state::GripperState;
use crate::robot::command_buffer::GRIPPER_CHANNEL;
use crate::robot::control_types::VelocityCommand;
use crate::robot::motion_controller::MotionController;
use crate::Finishable;

pub mod gripper_state;

const OPEN: f64 = -1.;
const CLOSE: f64 = 1.;

impl MotionController {
    /// Reads the current gripper state.
    /// # Errors
    /// * ResolutionFailure if the observation lacks the finger joint state.
    pub fn gripper_state(&self) -> ManipulatorResult<GripperState> {
        let command = self.handle().commands().read()[GRIPPER_CHANNEL];
        GripperState::from_observation(&self.observation(), command, self.config())
    }

    /// Opens the gripper until both fingers passed the open threshold and came to rest.
    ///
    /// # Return
    /// True if the gripper opened, false if the fingers got stuck.
    pub fn open_gripper(&mut self) -> ManipulatorResult<bool> {
        let threshold = self.config().gripper_open_threshold;
        let velocity_threshold = self.config().gripper_velocity_threshold;
        let opened = self.run("open_gripper", move |observation, _| {
            let qpos = observation.gripper_qpos()?;
            let qvel = observation.gripper_qvel()?;
            let command = VelocityCommand::idle().with_gripper(OPEN);
            let resting = qvel.iter().all(|velocity| velocity.abs() <= velocity_threshold);
            if qpos[0] >= threshold && qpos[1] <= -threshold && resting {
                return Ok(command.motion_finished());
            }
            Ok(command.with_residual(threshold - qpos[0].min(-qpos[1])))
        })?;
        info!(opened, "open_gripper done");
        Ok(opened)
    }

    /// Closes the gripper.
    ///
    /// Waits for the fingers to start moving and then for them to stop again, which happens
    /// both when they close on an object and when they close completely. If the fingers never
    /// start moving they are already resting on something and the routine succeeds right away.
    ///
    /// # Return
    /// True if the fingers came to rest, false if they kept moving for the whole tick budget.
    pub fn close_gripper(&mut self) -> ManipulatorResult<bool> {
        let threshold = self.config().gripper_velocity_threshold;
        let onset_ticks = self.config().gripper_onset_ticks;
        let mut started = false;
        let mut waited = 0;
        let closed = self.run("close_gripper", move |observation, _| {
            let qvel = observation.gripper_qvel()?;
            let moving = qvel.iter().any(|velocity| velocity.abs() >= threshold);
            let command = VelocityCommand::idle().with_gripper(CLOSE);
            if !started {
                if moving {
                    started = true;
                } else {
                    waited += 1;
                    if waited > onset_ticks {
                        return Ok(command.motion_finished());
                    }
                }
                return Ok(command);
            }
            if moving {
                Ok(command)
            } else {
                Ok(command.motion_finished())
            }
        })?;
        info!(closed, "close_gripper done");
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use crate::gripper::gripper_state::GripperStatus;
    use crate::robot::command_buffer::GRIPPER_CHANNEL;
    use crate::robot::motion_config::MotionConfig;
    use crate::robot::motion_controller::MotionController;
    use crate::simulation::kinematic::KinematicSim;
    use crate::simulation::{Simulation, SimulationConfig};
    use std::time::Duration;

    fn setup() -> (Simulation<KinematicSim>, MotionController) {
        let config = SimulationConfig {
            tick_period: None,
            lockstep_timeout: Some(Duration::from_millis(50)),
            stop_on_success: false,
            observation_timeout: Duration::from_secs(5),
        };
        let mut simulation = Simulation::new(KinematicSim::default(), config).unwrap();
        simulation.start().unwrap();
        let controller = MotionController::new(simulation.handle(), MotionConfig::default());
        (simulation, controller)
    }

    #[test]
    fn open_then_close_on_nothing() {
        let (mut simulation, mut controller) = setup();
        assert!(controller.open_gripper().unwrap());
        let state = controller.gripper_state().unwrap();
        assert_eq!(state.status, GripperStatus::Open);
        assert_eq!(state.command, -1.);
        assert!(state.finger_velocities.iter().all(|v| v.abs() < 0.01));

        assert!(controller.close_gripper().unwrap());
        let state = controller.gripper_state().unwrap();
        assert_eq!(state.status, GripperStatus::Closed);
        let action = controller.handle().commands().read();
        assert_eq!(action[GRIPPER_CHANNEL], 1.);
        assert!(action
            .iter()
            .enumerate()
            .all(|(channel, value)| channel == GRIPPER_CHANNEL || *value == 0.));
        simulation.stop().unwrap();
    }

    #[test]
    fn closing_a_closed_gripper_succeeds() {
        let (mut simulation, mut controller) = setup();
        assert!(controller.close_gripper().unwrap());
        assert!(controller.close_gripper().unwrap());
        assert_eq!(
            controller.gripper_state().unwrap().status,
            GripperStatus::Closed
        );
        simulation.stop().unwrap();
    }

    #[test]
    fn close_on_object() {
        let (mut simulation, mut controller) = setup();
        assert!(controller.open_gripper().unwrap());
        let object = controller.resolve("obj").unwrap().position;
        assert!(controller.move_to(&object).unwrap());
        assert!(controller.close_gripper().unwrap());
        let state = controller.gripper_state().unwrap();
        assert_eq!(state.status, GripperStatus::Gripping);
        assert!((state.width - 0.05).abs() < 1e-9);
        let held = simulation.with_backend(|sim| sim.held_object().map(String::from));
        assert_eq!(held.as_deref(), Some("obj"));
        simulation.stop().unwrap();
    }
}
