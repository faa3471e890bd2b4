// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Scene description of the [`KinematicSim`](`crate::simulation::kinematic::KinematicSim`).
//!
//! All positions are given in the robot frame, which is placed in the world by `base_position`
//! and `base_yaw`.
use serde::Deserialize;
use serde::Serialize;

/// A graspable box resting on a support surface.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ObjectConfig {
    pub name: String,
    /// Centre of the box in \[m\].
    pub position: [f64; 3],
    /// Rotation about the vertical axis in \[deg\].
    pub yaw: f64,
    /// Half of the edge length in \[m\].
    pub half_extent: f64,
}

/// A box-shaped appliance with a hinged door and a push button, e.g. a microwave.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ApplianceScene {
    pub name: String,
    /// Vertical door axis, given by one point on it.
    pub hinge: [f64; 3],
    /// Handle position relative to the hinge while the door is closed.
    pub handle_offset: [f64; 3],
    /// Half of the handle thickness between the fingers in \[m\].
    pub handle_half_width: f64,
    /// Opening the door turns the handle clockwise around the hinge when seen from above.
    pub opens_clockwise: bool,
    /// Mechanical limit of the door in \[deg\].
    pub max_door_angle: f64,
    /// Door angles below this count as closed in \[deg\].
    pub closed_angle: f64,
    /// Lower corner of the cooking chamber. Its z value is the chamber floor.
    pub interior_min: [f64; 3],
    /// Upper corner of the cooking chamber.
    pub interior_max: [f64; 3],
    pub button: [f64; 3],
    /// The button latches once the end effector gets this close in \[m\].
    pub press_radius: f64,
}

impl Default for ApplianceScene {
    fn default() -> Self {
        ApplianceScene {
            name: "microwave".to_string(),
            hinge: [0.55, 0.45, 1.07],
            handle_offset: [-0.03, -0.33, 0.],
            handle_half_width: 0.01,
            opens_clockwise: true,
            max_door_angle: 100.,
            closed_angle: 2.5,
            interior_min: [0.58, 0.12, 0.95],
            interior_max: [0.88, 0.43, 1.2],
            button: [0.55, 0.05, 1.],
            press_radius: 0.03,
        }
    }
}

impl ApplianceScene {
    /// Centre of the chamber floor.
    pub fn floor_center(&self) -> [f64; 3] {
        [
            (self.interior_min[0] + self.interior_max[0]) / 2.,
            (self.interior_min[1] + self.interior_max[1]) / 2.,
            self.interior_min[2],
        ]
    }

    pub(crate) fn above_floor(&self, x: f64, y: f64) -> bool {
        (self.interior_min[0]..=self.interior_max[0]).contains(&x)
            && (self.interior_min[1]..=self.interior_max[1]).contains(&y)
    }

    pub(crate) fn contains(&self, position: &[f64; 3]) -> bool {
        self.above_floor(position[0], position[1])
            && (self.interior_min[2]..=self.interior_max[2]).contains(&position[2])
    }
}

/// Geometry and dynamics of the kinematic scene.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    /// Simulated duration of one step in \[s\].
    pub dt: f64,
    /// Robot base position in the world frame.
    pub base_position: [f64; 3],
    /// Robot base rotation about the world z axis in \[deg\].
    pub base_yaw: f64,
    /// Metres per second per unit of a translational channel.
    pub linear_gain: f64,
    /// Radians per second per unit of a rotational channel.
    pub angular_gain: f64,
    pub finger_speed: f64,
    /// Maximum joint position of each finger in \[m\].
    pub finger_limit: f64,
    /// Something closer than this to the end effector ends up between the fingers.
    pub grasp_radius: f64,
    /// Centre of the sphere the end effector can reach.
    pub reach_center: [f64; 3],
    pub reach_radius: f64,
    pub counter_height: f64,
    pub home_position: [f64; 3],
    /// Extrinsic x-y-z Euler angles in \[deg\].
    pub home_orientation: [f64; 3],
    pub objects: Vec<ObjectConfig>,
    pub appliance: ApplianceScene,
    /// Object that has to end up in the appliance.
    pub task_object: String,
    /// Minimum distance between end effector and task object once the task is done.
    pub clearance: f64,
    /// Draw a top-down image on every render call.
    pub render_frames: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        SceneConfig {
            dt: 0.05,
            base_position: [0.5, -0.6, 0.],
            base_yaw: 90.,
            linear_gain: 1.,
            angular_gain: 5.,
            finger_speed: 0.1,
            finger_limit: 0.04,
            grasp_radius: 0.04,
            reach_center: [0., 0., 0.9],
            reach_radius: 1.,
            counter_height: 0.9,
            home_position: [0.45, 0., 1.1],
            home_orientation: [180., 0., 90.],
            objects: vec![ObjectConfig {
                name: "obj".to_string(),
                position: [0.45, -0.25, 0.925],
                yaw: 20.,
                half_extent: 0.025,
            }],
            appliance: ApplianceScene::default(),
            task_object: "obj".to_string(),
            clearance: 0.25,
            render_frames: false,
        }
    }
}

/// Sub-checks of the success predicate.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct TaskReport {
    pub object_in_appliance: bool,
    pub door_closed: bool,
    pub button_pressed: bool,
    pub gripper_clear: bool,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        self.object_in_appliance && self.door_closed && self.button_pressed && self.gripper_clear
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::scene::{ApplianceScene, SceneConfig, TaskReport};

    #[test]
    fn chamber_geometry() {
        let appliance = ApplianceScene::default();
        let floor = appliance.floor_center();
        assert!(appliance.above_floor(floor[0], floor[1]));
        assert!(appliance.contains(&[floor[0], floor[1], floor[2] + 0.03]));
        assert!(!appliance.contains(&[floor[0], floor[1], floor[2] - 0.03]));
        assert!(!appliance.above_floor(0.45, -0.25));
    }

    #[test]
    fn scene_from_partial_json() {
        let config: SceneConfig =
            serde_json::from_str(r#"{"base_yaw": 0.0, "appliance": {"name": "oven"}}"#).unwrap();
        assert_eq!(config.base_yaw, 0.);
        assert_eq!(config.appliance.name, "oven");
        assert_eq!(config.appliance.press_radius, 0.03);
        assert_eq!(config.objects.len(), 1);
    }

    #[test]
    fn report_needs_every_check() {
        let mut report = TaskReport {
            object_in_appliance: true,
            door_closed: true,
            button_pressed: true,
            gripper_clear: true,
        };
        assert!(report.succeeded());
        report.gripper_clear = false;
        assert!(!report.succeeded());
    }
}
