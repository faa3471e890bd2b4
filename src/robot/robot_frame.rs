// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the RobotFrame type which converts between the world frame and the robot frame.
use nalgebra::{Isometry3, Rotation3, Translation3, UnitQuaternion, Vector3};

use crate::exception::ManipulatorResult;
use crate::robot::observation::{Observation, BASE_POS, BASE_QUAT};

/// Pose of the robot base in the world frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RobotFrame {
    base: Isometry3<f64>,
}

impl RobotFrame {
    pub fn new(base_position: Vector3<f64>, base_orientation: UnitQuaternion<f64>) -> Self {
        RobotFrame {
            base: Isometry3::from_parts(Translation3::from(base_position), base_orientation),
        }
    }

    /// Reads the base pose from an observation.
    /// # Errors
    /// * ResolutionFailure if the observation does not contain the base pose.
    pub fn from_observation(observation: &Observation) -> ManipulatorResult<Self> {
        Ok(RobotFrame::new(
            observation.vector3(BASE_POS)?,
            observation.quaternion(BASE_QUAT)?,
        ))
    }

    pub fn base(&self) -> &Isometry3<f64> {
        &self.base
    }

    /// Expresses a world position, and optionally a world orientation, in the robot frame.
    pub fn to_robot_frame(
        &self,
        world_position: &Vector3<f64>,
        world_orientation: Option<&Rotation3<f64>>,
    ) -> (Vector3<f64>, Option<Rotation3<f64>>) {
        let base_rotation = self.base.rotation.to_rotation_matrix();
        let position = base_rotation.transpose() * (world_position - self.base.translation.vector);
        let orientation = world_orientation.map(|rotation| base_rotation.transpose() * rotation);
        (position, orientation)
    }

    /// Inverse of [`to_robot_frame`](`Self::to_robot_frame`).
    pub fn to_world_frame(
        &self,
        robot_position: &Vector3<f64>,
        robot_orientation: Option<&Rotation3<f64>>,
    ) -> (Vector3<f64>, Option<Rotation3<f64>>) {
        let base_rotation = self.base.rotation.to_rotation_matrix();
        let position = base_rotation * robot_position + self.base.translation.vector;
        let orientation = robot_orientation.map(|rotation| base_rotation * rotation);
        (position, orientation)
    }

    pub fn position_to_robot(&self, world_position: &Vector3<f64>) -> Vector3<f64> {
        self.base.inverse_transform_vector(&(world_position - self.base.translation.vector))
    }

    pub fn position_to_world(&self, robot_position: &Vector3<f64>) -> Vector3<f64> {
        self.base.transform_vector(robot_position) + self.base.translation.vector
    }

    pub fn orientation_to_robot(
        &self,
        world_orientation: &UnitQuaternion<f64>,
    ) -> UnitQuaternion<f64> {
        self.base.rotation.inverse() * world_orientation
    }

    pub fn orientation_to_world(
        &self,
        robot_orientation: &UnitQuaternion<f64>,
    ) -> UnitQuaternion<f64> {
        self.base.rotation * robot_orientation
    }
}

#[cfg(test)]
mod tests {
    use crate::robot::robot_frame::RobotFrame;
    use nalgebra::{Rotation3, UnitQuaternion, Vector3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    fn random_rotation(rng: &mut StdRng) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(
            rng.gen_range(-PI..PI),
            rng.gen_range(-PI / 2.0..PI / 2.0),
            rng.gen_range(-PI..PI),
        )
    }

    fn random_vector(rng: &mut StdRng, range: f64) -> Vector3<f64> {
        Vector3::new(
            rng.gen_range(-range..range),
            rng.gen_range(-range..range),
            rng.gen_range(-range..range),
        )
    }

    #[test]
    fn round_trip_is_identity() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let frame = RobotFrame::new(random_vector(&mut rng, 5.), random_rotation(&mut rng));
            let position = random_vector(&mut rng, 3.);
            let orientation = random_rotation(&mut rng).to_rotation_matrix();
            let (robot_position, robot_orientation) =
                frame.to_robot_frame(&position, Some(&orientation));
            let (back_position, back_orientation) =
                frame.to_world_frame(&robot_position, robot_orientation.as_ref());
            assert!((back_position - position).norm() < 1e-6);
            let back_orientation = back_orientation.unwrap();
            assert!((back_orientation.matrix() - orientation.matrix()).norm() < 1e-6);

            let robot_quaternion = frame.orientation_to_robot(&UnitQuaternion::from(orientation));
            let robot_matrix = robot_quaternion.to_rotation_matrix();
            assert!((robot_matrix.matrix() - robot_orientation.unwrap().matrix()).norm() < 1e-9);
            assert!((frame.position_to_robot(&position) - robot_position).norm() < 1e-9);
            assert!((frame.position_to_world(&robot_position) - position).norm() < 1e-6);
        }
    }

    #[test]
    fn base_rotated_by_quarter_turn() {
        let frame = RobotFrame::new(
            Vector3::new(0.5, -0.6, 0.),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI / 2.),
        );
        // one metre in front of the robot
        let (robot_position, orientation) = frame.to_robot_frame(&Vector3::new(0.5, 0.4, 1.), None);
        assert!(orientation.is_none());
        assert!((robot_position - Vector3::new(1., 0., 1.)).norm() < 1e-12);
        let world = frame.to_world_frame(&robot_position, Some(&Rotation3::identity()));
        assert!((world.1.unwrap().matrix() - frame.base().rotation.to_rotation_matrix().matrix())
            .norm()
            < 1e-12);
    }
}
