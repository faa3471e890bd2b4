// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the Observation type published by the simulation driver after every step.
use std::collections::BTreeMap;

use nalgebra::{UnitQuaternion, Vector3};
use serde::Deserialize;
use serde::Serialize;

use crate::exception::{ManipulatorException, ManipulatorResult};
use crate::utils::quat_from_xyzw;

/// end-effector position in the world frame
pub const EEF_POS: &str = "robot0_eef_pos";
/// end-effector orientation in the world frame (x-y-z-w)
pub const EEF_QUAT: &str = "robot0_eef_quat";
/// finger joint positions, left finger positive and right finger negative when open
pub const GRIPPER_QPOS: &str = "robot0_gripper_qpos";
/// finger joint velocities
pub const GRIPPER_QVEL: &str = "robot0_gripper_qvel";
/// robot base position in the world frame
pub const BASE_POS: &str = "robot0_base_pos";
/// robot base orientation in the world frame (x-y-z-w)
pub const BASE_QUAT: &str = "robot0_base_quat";

/// Builds the observation key `<name>_<suffix>`, e.g. `obj_pos` or `microwave_hinge_pos`.
pub fn entity_key(name: &str, suffix: &str) -> String {
    format!("{}_{}", name, suffix)
}

/// Read-only snapshot of the simulator state after one step.
///
/// All poses are given in the world frame; use a [`RobotFrame`](`crate::RobotFrame`) to express
/// them relative to the robot.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Observation {
    /// Number of steps since the last reset.
    pub timestep: u64,
    /// Simulated time since the last reset in \[s\].
    pub time: f64,
    /// Named quantities.
    pub values: BTreeMap<String, Vec<f64>>,
}

impl Observation {
    pub fn new(timestep: u64, time: f64) -> Self {
        Observation {
            timestep,
            time,
            values: BTreeMap::new(),
        }
    }

    pub fn insert<K: Into<String>, V: Into<Vec<f64>>>(&mut self, key: K, value: V) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&[f64]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn exact(&self, key: &str, len: usize) -> ManipulatorResult<&[f64]> {
        match self.get(key) {
            Some(values) if values.len() == len => Ok(values),
            _ => Err(ManipulatorException::ResolutionFailure {
                name: key.to_string(),
                key: key.to_string(),
            }),
        }
    }

    /// Reads a single number.
    /// # Errors
    /// * ResolutionFailure if the key is missing or does not hold exactly one value.
    pub fn scalar(&self, key: &str) -> ManipulatorResult<f64> {
        Ok(self.exact(key, 1)?[0])
    }

    /// Reads a three dimensional vector.
    /// # Errors
    /// * ResolutionFailure if the key is missing or does not hold exactly three values.
    pub fn vector3(&self, key: &str) -> ManipulatorResult<Vector3<f64>> {
        Ok(Vector3::from_column_slice(self.exact(key, 3)?))
    }

    /// Reads a quaternion stored in x-y-z-w order.
    /// # Errors
    /// * ResolutionFailure if the key is missing or does not hold a valid quaternion.
    pub fn quaternion(&self, key: &str) -> ManipulatorResult<UnitQuaternion<f64>> {
        quat_from_xyzw(self.exact(key, 4)?).map_err(|_| ManipulatorException::ResolutionFailure {
            name: key.to_string(),
            key: key.to_string(),
        })
    }

    pub fn eef_position(&self) -> ManipulatorResult<Vector3<f64>> {
        self.vector3(EEF_POS)
    }

    pub fn eef_quaternion(&self) -> ManipulatorResult<UnitQuaternion<f64>> {
        self.quaternion(EEF_QUAT)
    }

    /// Finger joint positions.
    pub fn gripper_qpos(&self) -> ManipulatorResult<[f64; 2]> {
        let values = self.exact(GRIPPER_QPOS, 2)?;
        Ok([values[0], values[1]])
    }

    /// Finger joint velocities.
    pub fn gripper_qvel(&self) -> ManipulatorResult<[f64; 2]> {
        let values = self.exact(GRIPPER_QVEL, 2)?;
        Ok([values[0], values[1]])
    }
}

#[cfg(test)]
mod tests {
    use crate::robot::observation::{entity_key, Observation, EEF_POS, EEF_QUAT, GRIPPER_QPOS};
    use crate::ManipulatorException;

    fn observation() -> Observation {
        let mut observation = Observation::new(3, 0.15);
        observation.insert(EEF_POS, [0.1, 0.2, 0.3]);
        observation.insert(EEF_QUAT, [0., 0., 0., 1.]);
        observation.insert(GRIPPER_QPOS, vec![0.04, -0.04]);
        observation.insert(entity_key("microwave", "door_angle"), [0.5]);
        observation
    }

    #[test]
    fn typed_access() {
        let observation = observation();
        assert_eq!(observation.eef_position().unwrap().as_slice(), &[0.1, 0.2, 0.3]);
        assert_eq!(observation.eef_quaternion().unwrap().angle(), 0.);
        assert_eq!(observation.gripper_qpos().unwrap(), [0.04, -0.04]);
        assert_eq!(observation.scalar("microwave_door_angle").unwrap(), 0.5);
    }

    #[test]
    fn missing_or_malformed_keys() {
        let observation = observation();
        match observation.vector3("obj_pos") {
            Err(ManipulatorException::ResolutionFailure { key, .. }) => assert_eq!(key, "obj_pos"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(observation.vector3("microwave_door_angle").is_err());
        assert!(observation.gripper_qvel().is_err());
    }

    #[test]
    fn json_round_trip() {
        let observation = observation();
        let json = serde_json::to_string(&observation).unwrap();
        let parsed: Observation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.timestep, 3);
        assert!(parsed.values.keys().eq(observation.values.keys()));
        let position = parsed.eef_position().unwrap();
        assert!((position - observation.eef_position().unwrap()).norm() < 1e-12);
    }
}
