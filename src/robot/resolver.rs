// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Looks up named entities in an observation and expresses their pose in the robot frame.
use nalgebra::{UnitQuaternion, Vector3};
use serde::Deserialize;
use serde::Serialize;

use crate::exception::{ManipulatorException, ManipulatorResult};
use crate::robot::observation::{entity_key, Observation};
use crate::robot::robot_frame::RobotFrame;
use crate::utils::quat_to_euler;

/// Pose of a named entity relative to the robot.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct ObjectPose {
    /// Position in the robot frame in \[m\].
    pub position: Vector3<f64>,
    /// Orientation in the robot frame.
    pub orientation: UnitQuaternion<f64>,
}

impl ObjectPose {
    /// Orientation as extrinsic x-y-z Euler angles in degrees.
    pub fn euler(&self) -> Vector3<f64> {
        quat_to_euler(&self.orientation)
    }
}

fn lookup_failure(name: &str, key: String) -> ManipulatorException {
    ManipulatorException::ResolutionFailure {
        name: name.to_string(),
        key,
    }
}

/// Resolves `<name>_pos` and `<name>_quat` into a robot frame pose.
///
/// # Errors
/// * ResolutionFailure if the entity is not part of the scene.
pub fn resolve_object(
    observation: &Observation,
    frame: &RobotFrame,
    name: &str,
) -> ManipulatorResult<ObjectPose> {
    let position_key = entity_key(name, "pos");
    let position = observation
        .vector3(&position_key)
        .map_err(|_| lookup_failure(name, position_key))?;
    let orientation_key = entity_key(name, "quat");
    let orientation = observation
        .quaternion(&orientation_key)
        .map_err(|_| lookup_failure(name, orientation_key))?;
    Ok(ObjectPose {
        position: frame.position_to_robot(&position),
        orientation: frame.orientation_to_robot(&orientation),
    })
}

/// Resolves a world position stored under `<name>_<anchor>`, e.g. a hinge or a button,
/// into the robot frame.
///
/// # Errors
/// * ResolutionFailure if the anchor is not part of the scene.
pub fn resolve_anchor(
    observation: &Observation,
    frame: &RobotFrame,
    name: &str,
    anchor: &str,
) -> ManipulatorResult<Vector3<f64>> {
    let key = entity_key(name, anchor);
    let position = observation
        .vector3(&key)
        .map_err(|_| lookup_failure(name, key))?;
    Ok(frame.position_to_robot(&position))
}

#[cfg(test)]
mod tests {
    use crate::robot::observation::Observation;
    use crate::robot::resolver::{resolve_anchor, resolve_object};
    use crate::robot::robot_frame::RobotFrame;
    use crate::ManipulatorException;
    use nalgebra::{UnitQuaternion, Vector3};
    use std::f64::consts::PI;

    fn frame() -> RobotFrame {
        RobotFrame::new(
            Vector3::new(1., 0., 0.),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI / 2.),
        )
    }

    #[test]
    fn resolves_into_robot_frame() {
        let mut observation = Observation::new(0, 0.);
        observation.insert("obj_pos", [1., 0.5, 0.9]);
        let yaw = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI / 2.);
        let q = yaw.quaternion();
        observation.insert("obj_quat", [q.i, q.j, q.k, q.w]);
        let pose = resolve_object(&observation, &frame(), "obj").unwrap();
        assert!((pose.position - Vector3::new(0.5, 0., 0.9)).norm() < 1e-12);
        assert!(pose.orientation.angle() < 1e-12);
        assert!(pose.euler().norm() < 1e-9);
    }

    #[test]
    fn unknown_object_fails() {
        let mut observation = Observation::new(0, 0.);
        observation.insert("obj_pos", [1., 0.5, 0.9]);
        match resolve_object(&observation, &frame(), "obj") {
            Err(ManipulatorException::ResolutionFailure { name, key }) => {
                assert_eq!(name, "obj");
                assert_eq!(key, "obj_quat");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(resolve_object(&observation, &frame(), "cup").is_err());
    }

    #[test]
    fn anchors() {
        let mut observation = Observation::new(0, 0.);
        observation.insert("microwave_hinge_pos", [0.5, 0.5, 1.]);
        let hinge = resolve_anchor(&observation, &frame(), "microwave", "hinge_pos").unwrap();
        assert!((hinge - Vector3::new(0.5, 0.5, 1.)).norm() < 1e-12);
        assert!(resolve_anchor(&observation, &frame(), "microwave", "handle_pos").is_err());
    }
}
