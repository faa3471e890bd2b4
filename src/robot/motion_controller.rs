// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the MotionController type with the closed-loop primitive routines.
use std::sync::Arc;
use std::time::Duration;

use nalgebra::{UnitQuaternion, Vector3};
use tracing::{info, warn};

use crate::exception::{create_invalid_argument, ManipulatorResult};
use crate::robot::control_loop::{into_outcome, ControlLoop};
use crate::robot::control_tools::{clip, tiered_angular_rate, tiered_translation};
use crate::robot::control_types::VelocityCommand;
use crate::robot::logger::{Logger, Record};
use crate::robot::motion_config::MotionConfig;
use crate::robot::observation::Observation;
use crate::robot::resolver::{resolve_anchor, resolve_object, ObjectPose};
use crate::robot::robot_frame::RobotFrame;
use crate::simulation::SimulationHandle;
use crate::utils::{orientation_from_slice, quat_to_euler, subtract_angles};
use crate::Finishable;

/// End-effector pose of an observation, expressed in the robot frame.
pub(crate) fn eef_in_robot_frame(
    observation: &Observation,
) -> ManipulatorResult<(Vector3<f64>, UnitQuaternion<f64>)> {
    let frame = RobotFrame::from_observation(observation)?;
    Ok((
        frame.position_to_robot(&observation.eef_position()?),
        frame.orientation_to_robot(&observation.eef_quaternion()?),
    ))
}

fn finished() -> ManipulatorResult<VelocityCommand> {
    Ok(VelocityCommand::idle().motion_finished())
}

/// Issues velocity commands through the command buffer of a running [`Simulation`](`crate::Simulation`)
/// until a positional, rotational or gripper goal is reached.
///
/// All targets are given in the robot frame. Every routine blocks until it converged, stalled
/// or ran out of ticks and returns true if it converged, false otherwise. The motion channels
/// of the command buffer are zero once a routine returns.
pub struct MotionController {
    handle: SimulationHandle,
    config: MotionConfig,
    logger: Logger,
    last_failure: Option<String>,
}

impl MotionController {
    pub fn new(handle: SimulationHandle, config: MotionConfig) -> Self {
        MotionController {
            handle,
            logger: Logger::new(config.log_size),
            config,
            last_failure: None,
        }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn handle(&self) -> &SimulationHandle {
        &self.handle
    }

    /// The latest observation.
    pub fn observation(&self) -> Arc<Observation> {
        self.handle.observation()
    }

    pub fn robot_frame(&self) -> ManipulatorResult<RobotFrame> {
        RobotFrame::from_observation(&self.observation())
    }

    /// End-effector position in the robot frame.
    pub fn eef_position(&self) -> ManipulatorResult<Vector3<f64>> {
        Ok(eef_in_robot_frame(&self.observation())?.0)
    }

    /// End-effector orientation in the robot frame.
    pub fn eef_orientation(&self) -> ManipulatorResult<UnitQuaternion<f64>> {
        Ok(eef_in_robot_frame(&self.observation())?.1)
    }

    /// End-effector orientation in the robot frame as Euler angles in \[deg\].
    pub fn eef_euler(&self) -> ManipulatorResult<Vector3<f64>> {
        Ok(quat_to_euler(&self.eef_orientation()?))
    }

    /// Pose of a named object in the robot frame.
    /// # Errors
    /// * ResolutionFailure if the object is not part of the scene.
    pub fn resolve(&self, name: &str) -> ManipulatorResult<ObjectPose> {
        let observation = self.observation();
        resolve_object(&observation, &RobotFrame::from_observation(&observation)?, name)
    }

    /// Position of an anchor like `hinge_pos` of a named fixture in the robot frame.
    /// # Errors
    /// * ResolutionFailure if the fixture or its anchor is not part of the scene.
    pub fn resolve_anchor(&self, name: &str, anchor: &str) -> ManipulatorResult<Vector3<f64>> {
        let observation = self.observation();
        resolve_anchor(
            &observation,
            &RobotFrame::from_observation(&observation)?,
            name,
            anchor,
        )
    }

    /// Determines whether `target` lies inside the reachable workspace.
    pub fn is_reachable(&self, target: &Vector3<f64>) -> bool {
        let center = Vector3::from_column_slice(&self.config.workspace_center);
        (target - center).norm() <= self.config.workspace_radius
    }

    /// The control records of the most recent loops, oldest first.
    pub fn last_records(&self) -> Vec<Record> {
        self.logger.records()
    }

    /// Why the most recent routine returned false, if it did.
    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    pub(crate) fn fail(&mut self, message: String) -> ManipulatorResult<bool> {
        warn!("{}", message);
        self.last_failure = Some(message);
        Ok(false)
    }

    pub(crate) fn run<F>(&mut self, name: &str, motion_callback: F) -> ManipulatorResult<bool>
    where
        F: FnMut(&Observation, &Duration) -> ManipulatorResult<VelocityCommand>,
    {
        self.last_failure = None;
        let result = ControlLoop::new(
            name,
            &self.handle,
            &mut self.logger,
            &self.config,
            motion_callback,
        )
        .run();
        into_outcome(result, &mut self.last_failure)
    }

    /// Moves the end effector in a straight line to `target`.
    ///
    /// Finishes once every axis is within `position_tolerance` of the target.
    /// # Errors
    /// * InvalidArgument if the target is not finite.
    /// # Return
    /// True if the target was reached, false if it is outside the workspace or the motion stalled.
    pub fn move_to(&mut self, target: &Vector3<f64>) -> ManipulatorResult<bool> {
        if !target.iter().all(|value| value.is_finite()) {
            return Err(create_invalid_argument(format!(
                "{:?} is not a valid target",
                target.as_slice()
            )));
        }
        if !self.is_reachable(target) {
            return self.fail(format!(
                "move_to: target {:?} is outside of the workspace",
                target.as_slice()
            ));
        }
        info!(x = target.x, y = target.y, z = target.z, "moving");
        let config = self.config;
        let target = *target;
        let reached = self.run("move_to", move |observation, _| {
            let (position, _) = eef_in_robot_frame(observation)?;
            let error = target - position;
            if error.amax() <= config.position_tolerance {
                return finished();
            }
            let velocity = tiered_translation(&error, &config);
            Ok(VelocityCommand::linear(velocity.into()).with_residual(error.norm()))
        })?;
        info!(reached, "move_to done");
        Ok(reached)
    }

    /// Rotates the end effector to an absolute orientation, every Euler axis at its own tiered rate.
    ///
    /// # Arguments
    /// * `orientation` - three Euler angles in \[deg\] or a quaternion in x-y-z-w order.
    /// # Errors
    /// * InvalidArgument for any other number of values. No command is written in that case.
    pub fn rotate_to(&mut self, orientation: &[f64]) -> ManipulatorResult<bool> {
        let target = quat_to_euler(&orientation_from_slice(orientation)?);
        info!(
            roll = target.x,
            pitch = target.y,
            yaw = target.z,
            "rotating"
        );
        let config = self.config;
        let reached = self.run("rotate_to", move |observation, _| {
            let (_, orientation) = eef_in_robot_frame(observation)?;
            let current = quat_to_euler(&orientation);
            let error = Vector3::from_fn(|i, _| subtract_angles(target[i], current[i]));
            let rates = error.map(|angle| tiered_angular_rate(angle, &config));
            if error.amax() <= config.angle_tolerance || rates.iter().all(|rate| *rate == 0.) {
                return finished();
            }
            Ok(VelocityCommand::angular(rates.into()).with_residual(error.amax()))
        })?;
        info!(reached, "rotate_to done");
        Ok(reached)
    }

    /// Rotates about a single axis towards `orientation`.
    ///
    /// Only the rotational channel of `axis` is driven, with the matching component of the
    /// remaining rotation vector clipped to `max_angle_velocity`.
    /// # Errors
    /// * InvalidArgument for an axis other than 0, 1 or 2 or an orientation of the wrong length.
    pub fn rotate_axis(&mut self, orientation: &[f64], axis: usize) -> ManipulatorResult<bool> {
        if axis > 2 {
            return Err(create_invalid_argument(format!(
                "axis has to be 0, 1 or 2, got {}",
                axis
            )));
        }
        let target = orientation_from_slice(orientation)?;
        info!(axis, "rotating about a single axis");
        let config = self.config;
        let reached = self.run("rotate_axis", move |observation, _| {
            let (_, current) = eef_in_robot_frame(observation)?;
            let rotation = (target * current.inverse()).scaled_axis();
            if rotation.norm() < config.rotation_vector_tolerance {
                return finished();
            }
            let rate = clip(rotation[axis], config.max_angle_velocity);
            if rate.abs() < config.min_angle_velocity {
                return finished();
            }
            let mut angular = [0.; 3];
            angular[axis] = rate;
            Ok(VelocityCommand::angular(angular).with_residual(rotation[axis].abs()))
        })?;
        info!(reached, "rotate_axis done");
        Ok(reached)
    }

    /// Applies a constant translational velocity for `duration` of simulated time.
    pub fn velocity_pulse(
        &mut self,
        velocity: &Vector3<f64>,
        duration: Duration,
    ) -> ManipulatorResult<bool> {
        let command = VelocityCommand::linear((*velocity).into());
        self.run("velocity_pulse", move |_, elapsed| {
            if *elapsed >= duration {
                return finished();
            }
            Ok(command)
        })
    }

    /// Lowers the end effector at `max_velocity` until the named object stops moving.
    /// # Errors
    /// * ResolutionFailure if the object is not part of the scene.
    pub fn lower_until_settled(&mut self, name: &str) -> ManipulatorResult<bool> {
        self.resolve(name)?;
        let config = self.config;
        let name = name.to_string();
        let mut previous: Option<f64> = None;
        let mut ticks = 0;
        self.run("lower_until_settled", move |observation, _| {
            let frame = RobotFrame::from_observation(observation)?;
            let height = resolve_object(observation, &frame, &name)?.position.z;
            ticks += 1;
            let settled = previous
                .map(|previous| (previous - height).abs() <= config.settle_distance)
                .unwrap_or(false);
            previous = Some(height);
            // the first answers may still reflect the command of the previous routine
            if settled && ticks > 2 {
                return finished();
            }
            Ok(VelocityCommand::linear([0., 0., -config.max_velocity]))
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::exception::ManipulatorException;
    use crate::robot::command_buffer::{GRIPPER_CHANNEL, ROTATION_OFFSET};
    use crate::robot::motion_config::MotionConfig;
    use crate::robot::motion_controller::MotionController;
    use crate::simulation::kinematic::KinematicSim;
    use crate::simulation::{Simulation, SimulationConfig};
    use crate::utils::{quat_to_xyzw, subtract_angles};
    use nalgebra::{UnitQuaternion, Vector3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::time::Duration;

    fn lockstep() -> SimulationConfig {
        SimulationConfig {
            tick_period: None,
            lockstep_timeout: Some(Duration::from_millis(50)),
            stop_on_success: false,
            observation_timeout: Duration::from_secs(5),
        }
    }

    fn setup() -> (Simulation<KinematicSim>, MotionController) {
        let mut simulation = Simulation::new(KinematicSim::default(), lockstep()).unwrap();
        simulation.start().unwrap();
        let controller = MotionController::new(simulation.handle(), MotionConfig::default());
        (simulation, controller)
    }

    #[test]
    fn move_to_random_targets() {
        let (mut simulation, mut controller) = setup();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            let target = Vector3::new(
                rng.gen_range(0.3..0.6),
                rng.gen_range(-0.3..0.3),
                rng.gen_range(0.95..1.3),
            );
            assert!(controller.move_to(&target).unwrap());
            let position = controller.eef_position().unwrap();
            assert!(
                (position - target).amax() <= 0.02 + 1e-9,
                "{:?} vs {:?}",
                position,
                target
            );
            let action = controller.handle().commands().read();
            assert_eq!(action[0..3], [0., 0., 0.]);
        }
        simulation.stop().unwrap();
    }

    #[test]
    fn move_to_outside_workspace_fails_without_moving() {
        let (mut simulation, mut controller) = setup();
        let generation = controller.handle().commands().generation();
        assert!(!controller.move_to(&Vector3::new(2., 0., 1.)).unwrap());
        assert!(controller.last_failure().unwrap().contains("workspace"));
        assert_eq!(controller.handle().commands().generation(), generation);
        simulation.stop().unwrap();
    }

    #[test]
    fn blocked_motion_stalls() {
        let (mut simulation, mut controller) = setup();
        // inside the workspace but below the counter top
        assert!(!controller.move_to(&Vector3::new(0.45, -0.1, 0.8)).unwrap());
        assert!(controller.last_failure().unwrap().contains("stalled"));
        assert!(!controller.last_records().is_empty());
        assert_eq!(controller.handle().commands().read()[0..3], [0., 0., 0.]);
        simulation.stop().unwrap();
    }

    #[test]
    fn rotate_to_rejects_wrong_arity_without_commands() {
        let simulation = Simulation::new(KinematicSim::default(), lockstep()).unwrap();
        let mut controller = MotionController::new(simulation.handle(), MotionConfig::default());
        for orientation in [vec![], vec![90.], vec![0., 90.], vec![0., 0., 0., 1., 0.]] {
            match controller.rotate_to(&orientation) {
                Err(ManipulatorException::InvalidArgument { .. }) => {}
                other => panic!("expected InvalidArgument, got {:?}", other),
            }
        }
        assert!(matches!(
            controller.rotate_axis(&[0., 0., 0.], 3),
            Err(ManipulatorException::InvalidArgument { .. })
        ));
        assert_eq!(controller.handle().commands().generation(), 0);
    }

    #[test]
    fn rotate_to_euler_and_quaternion() {
        let (mut simulation, mut controller) = setup();
        assert!(controller.rotate_to(&[150., 10., 60.]).unwrap());
        let euler = controller.eef_euler().unwrap();
        for (current, target) in euler.iter().zip([150., 10., 60.].iter()) {
            assert!(subtract_angles(*current, *target).abs() <= 2. + 1e-9);
        }
        // quaternion of roll 180, pitch 0, yaw 90
        let half = std::f64::consts::FRAC_1_SQRT_2;
        assert!(controller.rotate_to(&[half, half, 0., 0.]).unwrap());
        let euler = controller.eef_euler().unwrap();
        assert!(subtract_angles(euler.x, 180.).abs() <= 2. + 1e-9);
        assert!(subtract_angles(euler.z, 90.).abs() <= 2. + 1e-9);
        let action = controller.handle().commands().read();
        assert_eq!(action[ROTATION_OFFSET..ROTATION_OFFSET + 3], [0., 0., 0.]);
        simulation.stop().unwrap();
    }

    #[test]
    fn rotate_about_vertical_axis() {
        let (mut simulation, mut controller) = setup();
        assert!(controller.rotate_axis(&[180., 0., 40.], 2).unwrap());
        let euler = controller.eef_euler().unwrap();
        // stops once the rotation vector is shorter than 0.1 rad
        assert!(subtract_angles(euler.z, 40.).abs() < 0.1f64.to_degrees());
        simulation.stop().unwrap();
    }

    #[test]
    fn rotate_axis_ignores_other_axes() {
        let (mut simulation, mut controller) = setup();
        let start = controller.eef_orientation().unwrap();
        // 30 degrees about the fixed x axis, nothing about z
        let target = UnitQuaternion::from_euler_angles(30f64.to_radians(), 0., 0.) * start;
        assert!(controller.rotate_axis(&quat_to_xyzw(&target), 2).unwrap());
        let end = controller.eef_orientation().unwrap();
        assert!(end.angle_to(&start) < 1e-9);
        assert!((end.angle_to(&target) - 30f64.to_radians()).abs() < 1e-9);
        simulation.stop().unwrap();
    }

    #[test]
    fn pulse_lasts_for_the_given_time() {
        let (mut simulation, mut controller) = setup();
        let start = controller.eef_position().unwrap();
        assert!(controller
            .velocity_pulse(&Vector3::new(0.1, 0., 0.), Duration::from_millis(500))
            .unwrap());
        let travelled = controller.eef_position().unwrap() - start;
        assert!((travelled.x - 0.05).abs() < 0.011, "{}", travelled.x);
        assert_eq!(controller.handle().commands().read()[GRIPPER_CHANNEL], 0.);
        simulation.stop().unwrap();
    }

    #[test]
    fn stopped_simulation_is_reported() {
        let mut simulation = Simulation::new(KinematicSim::default(), lockstep()).unwrap();
        let mut controller = MotionController::new(simulation.handle(), MotionConfig::default());
        simulation.start().unwrap();
        simulation.stop().unwrap();
        assert!(matches!(
            controller.move_to(&Vector3::new(0.4, 0., 1.)),
            Err(ManipulatorException::SimulationStopped { succeeded: false })
        ));
    }
}
