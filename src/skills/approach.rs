// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the two-phase approach used by most skills.
use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix3, Vector3};
use serde::Deserialize;
use serde::Serialize;

use crate::exception::{create_invalid_argument, ManipulatorException};

/// Side from which the end effector approaches a destination.
///
/// The first waypoint keeps one axis of the current end-effector position and takes the other
/// two from the destination. The second waypoint is the destination itself.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApproachDirection {
    /// Keeps the depth (x) and moves forward last.
    Front,
    /// Comes in from the left (+y) side: keeps the lateral position unless it is right of the
    /// destination and moves towards -y last.
    Left,
    /// Comes in from the right (-y) side: keeps the lateral position unless it is left of the
    /// destination and moves towards +y last.
    Right,
    /// Keeps the height (z) and descends last.
    Up,
}

impl ApproachDirection {
    /// Index of the robot-frame axis that is kept during the first phase.
    pub fn locked_axis(&self) -> usize {
        match self {
            ApproachDirection::Front => 0,
            ApproachDirection::Left | ApproachDirection::Right => 1,
            ApproachDirection::Up => 2,
        }
    }

    fn projection(&self) -> Matrix3<f64> {
        let mut projection = Matrix3::zeros();
        let axis = self.locked_axis();
        projection[(axis, axis)] = 1.;
        projection
    }
}

impl fmt::Display for ApproachDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ApproachDirection::Front => "front",
            ApproachDirection::Left => "left",
            ApproachDirection::Right => "right",
            ApproachDirection::Up => "up",
        };
        write!(f, "{}", text)
    }
}

impl FromStr for ApproachDirection {
    type Err = ManipulatorException;

    fn from_str(direction: &str) -> Result<Self, Self::Err> {
        match direction.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(ApproachDirection::Front),
            "left" => Ok(ApproachDirection::Left),
            "right" => Ok(ApproachDirection::Right),
            "up" => Ok(ApproachDirection::Up),
            _ => Err(create_invalid_argument(format!(
                "unknown approach direction {:?}, expected front, left, right or up",
                direction
            ))),
        }
    }
}

/// Computes the two waypoints of an approach.
///
/// For a lateral approach that starts on the wrong side the first waypoint lies level with the
/// destination, so the approach degenerates into a direct move.
pub fn approach_waypoints(
    current: &Vector3<f64>,
    destination: &Vector3<f64>,
    direction: ApproachDirection,
) -> [Vector3<f64>; 2] {
    let keep = direction.projection();
    let mut waypoint = keep * current + (Matrix3::identity() - keep) * destination;
    match direction {
        ApproachDirection::Left => waypoint.y = waypoint.y.max(destination.y),
        ApproachDirection::Right => waypoint.y = waypoint.y.min(destination.y),
        ApproachDirection::Front | ApproachDirection::Up => {}
    }
    [waypoint, *destination]
}

#[cfg(test)]
mod tests {
    use crate::exception::ManipulatorException;
    use crate::skills::approach::{approach_waypoints, ApproachDirection};
    use nalgebra::Vector3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn from_above_keeps_the_height_first() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let current = Vector3::from_fn(|_, _| rng.gen_range(-1.0..1.0));
            let destination = Vector3::from_fn(|_, _| rng.gen_range(-1.0..1.0));
            let [first, last] = approach_waypoints(&current, &destination, ApproachDirection::Up);
            assert_eq!(first.x, destination.x);
            assert_eq!(first.y, destination.y);
            assert_eq!(first.z, current.z);
            assert_eq!(last, destination);
        }
    }

    #[test]
    fn locked_axes() {
        let current = Vector3::new(1., 2., 3.);
        let destination = Vector3::new(4., 5., 6.);
        let [first, _] = approach_waypoints(&current, &destination, ApproachDirection::Front);
        assert_eq!(first, Vector3::new(1., 5., 6.));
        let [first, _] = approach_waypoints(&current, &destination, ApproachDirection::Right);
        assert_eq!(first, Vector3::new(4., 2., 6.));
    }

    #[test]
    fn lateral_approaches_come_from_their_side() {
        let destination = Vector3::new(0.5, 0., 1.);
        let left_of = Vector3::new(0.3, 0.2, 1.2);
        let right_of = Vector3::new(0.3, -0.2, 1.2);

        let [first, _] = approach_waypoints(&left_of, &destination, ApproachDirection::Left);
        assert_eq!(first, Vector3::new(0.5, 0.2, 1.));
        let [first, _] = approach_waypoints(&right_of, &destination, ApproachDirection::Right);
        assert_eq!(first, Vector3::new(0.5, -0.2, 1.));

        // starting on the opposite side there is nothing to keep
        let [first, _] = approach_waypoints(&right_of, &destination, ApproachDirection::Left);
        assert_eq!(first, destination);
        let [first, _] = approach_waypoints(&left_of, &destination, ApproachDirection::Right);
        assert_eq!(first, destination);
    }

    #[test]
    fn parse_directions() {
        assert_eq!("Front".parse::<ApproachDirection>().unwrap(), ApproachDirection::Front);
        assert_eq!(" up ".parse::<ApproachDirection>().unwrap(), ApproachDirection::Up);
        assert!(matches!(
            "diagonal".parse::<ApproachDirection>(),
            Err(ManipulatorException::InvalidArgument { .. })
        ));
        let parsed: ApproachDirection = serde_json::from_str("\"left\"").unwrap();
        assert_eq!(parsed, ApproachDirection::Left);
        assert_eq!(ApproachDirection::Right.to_string(), "right");
    }
}
