// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the KinematicSim backend.
//!
//! A lightweight stand-in for a physics engine: the end effector follows the commanded
//! velocities exactly, two prismatic fingers close until they touch something, held objects
//! follow the end effector and released objects drop onto the surface below them. The
//! appliance door turns about its hinge while its handle is held.
use nalgebra::{UnitQuaternion, Vector2, Vector3};
use tracing::debug;

use crate::exception::ManipulatorResult;
use crate::robot::command_buffer::{Action, GRIPPER_CHANNEL, ROTATION_OFFSET, TRANSLATION_OFFSET};
use crate::robot::observation::{
    entity_key, Observation, BASE_POS, BASE_QUAT, EEF_POS, EEF_QUAT, GRIPPER_QPOS, GRIPPER_QVEL,
};
use crate::robot::robot_frame::RobotFrame;
use crate::simulation::backend::{Backend, Frame};
use crate::simulation::scene::{SceneConfig, TaskReport};
use crate::utils::{euler_to_quat, quat_to_euler, quat_to_xyzw, subtract_angles};

const FRAME_SIZE: u32 = 64;

#[derive(Debug, Copy, Clone, PartialEq)]
enum Held {
    Object(usize),
    Handle,
}

#[derive(Debug, Clone)]
struct SceneObject {
    name: String,
    position: Vector3<f64>,
    yaw: f64,
    half_extent: f64,
}

#[derive(Debug, Clone)]
struct SceneState {
    timestep: u64,
    eef: Vector3<f64>,
    orientation: UnitQuaternion<f64>,
    /// joint position of one finger, the other one mirrors it
    finger: f64,
    finger_velocity: f64,
    held: Option<Held>,
    objects: Vec<SceneObject>,
    /// in degrees
    door_angle: f64,
    button_pressed: bool,
}

/// Kinematic single-arm scene with a counter, graspable boxes and one appliance.
pub struct KinematicSim {
    config: SceneConfig,
    frame: RobotFrame,
    initial: SceneState,
    state: SceneState,
    renderer_open: bool,
    image: Option<Frame>,
}

fn vector(values: &[f64; 3]) -> Vector3<f64> {
    Vector3::new(values[0], values[1], values[2])
}

impl KinematicSim {
    pub fn new(config: SceneConfig) -> Self {
        let frame = RobotFrame::new(
            vector(&config.base_position),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), config.base_yaw.to_radians()),
        );
        let initial = SceneState {
            timestep: 0,
            eef: vector(&config.home_position),
            orientation: euler_to_quat(&vector(&config.home_orientation)),
            finger: 0.,
            finger_velocity: 0.,
            held: None,
            objects: config
                .objects
                .iter()
                .map(|object| SceneObject {
                    name: object.name.clone(),
                    position: vector(&object.position),
                    yaw: object.yaw,
                    half_extent: object.half_extent,
                })
                .collect(),
            door_angle: 0.,
            button_pressed: false,
        };
        KinematicSim {
            config,
            frame,
            state: initial.clone(),
            initial,
            renderer_open: true,
            image: None,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// End-effector position in the robot frame.
    pub fn eef_position(&self) -> Vector3<f64> {
        self.state.eef
    }

    /// Object position in the robot frame.
    pub fn object_position(&self, name: &str) -> Option<Vector3<f64>> {
        self.state
            .objects
            .iter()
            .find(|object| object.name == name)
            .map(|object| object.position)
    }

    /// Moves an object, e.g. out of reach. The object is released if it was held.
    pub fn place_object(&mut self, name: &str, position: [f64; 3]) -> bool {
        let index = match self.state.objects.iter().position(|object| object.name == name) {
            Some(index) => index,
            None => return false,
        };
        if self.state.held == Some(Held::Object(index)) {
            self.state.held = None;
        }
        self.state.objects[index].position = vector(&position);
        true
    }

    /// Door angle in \[deg\].
    pub fn door_angle(&self) -> f64 {
        self.state.door_angle
    }

    pub fn set_door_angle(&mut self, angle: f64) {
        self.state.door_angle = angle.max(0.).min(self.config.appliance.max_door_angle);
    }

    pub fn button_pressed(&self) -> bool {
        self.state.button_pressed
    }

    /// Name of the held object, if any.
    pub fn held_object(&self) -> Option<&str> {
        match self.state.held {
            Some(Held::Object(index)) => Some(self.state.objects[index].name.as_str()),
            _ => None,
        }
    }

    pub fn holds_handle(&self) -> bool {
        self.state.held == Some(Held::Handle)
    }

    pub fn task_report(&self) -> TaskReport {
        let appliance = &self.config.appliance;
        let mut report = TaskReport {
            door_closed: self.state.door_angle < appliance.closed_angle,
            button_pressed: self.state.button_pressed,
            ..TaskReport::default()
        };
        let task_object = self
            .state
            .objects
            .iter()
            .enumerate()
            .find(|(_, object)| object.name == self.config.task_object);
        if let Some((index, object)) = task_object {
            let position = [object.position.x, object.position.y, object.position.z];
            report.object_in_appliance =
                appliance.contains(&position) && self.state.held != Some(Held::Object(index));
            let distance = (self.state.eef - object.position).norm();
            report.gripper_clear = distance >= self.config.clearance;
        }
        report
    }

    fn hinge(&self) -> Vector3<f64> {
        vector(&self.config.appliance.hinge)
    }

    /// signed rotation of the handle about the hinge for a door angle in degrees
    fn door_rotation(&self, angle: f64) -> UnitQuaternion<f64> {
        let sign = if self.config.appliance.opens_clockwise { -1. } else { 1. };
        UnitQuaternion::from_axis_angle(&Vector3::z_axis(), sign * angle.to_radians())
    }

    fn handle_position(&self) -> Vector3<f64> {
        let offset = vector(&self.config.appliance.handle_offset);
        self.hinge() + self.door_rotation(self.state.door_angle) * offset
    }

    /// door angle that puts the handle closest to `position`
    fn door_angle_towards(&self, position: &Vector3<f64>) -> f64 {
        let offset = vector(&self.config.appliance.handle_offset);
        let closed = Vector2::new(offset.x, offset.y);
        let current = Vector2::new(position.x - self.hinge().x, position.y - self.hinge().y);
        let closed_heading = closed.y.atan2(closed.x).to_degrees();
        let heading = current.y.atan2(current.x).to_degrees();
        let angle = if self.config.appliance.opens_clockwise {
            subtract_angles(closed_heading, heading)
        } else {
            subtract_angles(heading, closed_heading)
        };
        angle.max(0.).min(self.config.appliance.max_door_angle)
    }

    fn support_height(&self, x: f64, y: f64) -> f64 {
        if self.config.appliance.above_floor(x, y) {
            self.config.appliance.interior_min[2]
        } else {
            self.config.counter_height
        }
    }

    fn clamp_to_reach(&self, position: Vector3<f64>) -> Vector3<f64> {
        let center = vector(&self.config.reach_center);
        let offset = position - center;
        if offset.norm() > self.config.reach_radius {
            center + offset.normalize() * self.config.reach_radius
        } else {
            position
        }
    }

    fn move_end_effector(&mut self, action: &Action) {
        let dt = self.config.dt;
        let velocity = Vector3::from_column_slice(
            &action[TRANSLATION_OFFSET..TRANSLATION_OFFSET + 3],
        ) * self.config.linear_gain;
        let desired = self.state.eef + velocity * dt;
        if self.state.held == Some(Held::Handle) {
            self.state.door_angle = self.door_angle_towards(&desired);
            self.state.eef = self.handle_position();
        } else {
            let mut position = self.clamp_to_reach(desired);
            let lowest = self.support_height(position.x, position.y)
                + match self.state.held {
                    Some(Held::Object(index)) => self.state.objects[index].half_extent,
                    _ => 0.,
                };
            position.z = position.z.max(lowest);
            self.state.eef = position;
        }

        let rates = Vector3::from_column_slice(&action[ROTATION_OFFSET..ROTATION_OFFSET + 3])
            * self.config.angular_gain
            * dt;
        if rates.norm() > 0. {
            let euler = quat_to_euler(&self.state.orientation) + rates.map(f64::to_degrees);
            self.state.orientation = euler_to_quat(&euler);
        }
    }

    fn grasp_candidate(&self) -> Option<(Held, f64)> {
        let eef = self.state.eef;
        let radius = self.config.grasp_radius;
        let object = self
            .state
            .objects
            .iter()
            .enumerate()
            .filter(|(_, object)| object.half_extent <= self.config.finger_limit)
            .map(|(index, object)| (index, (object.position - eef).norm(), object.half_extent))
            .filter(|(_, distance, _)| *distance < radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _, half_extent)| (Held::Object(index), half_extent));
        if object.is_some() {
            return object;
        }
        if (self.handle_position() - eef).norm() < radius {
            return Some((Held::Handle, self.config.appliance.handle_half_width));
        }
        None
    }

    fn release(&mut self) {
        if let Some(Held::Object(index)) = self.state.held {
            let object = &self.state.objects[index];
            let floor = self.support_height(object.position.x, object.position.y);
            let resting = floor + object.half_extent;
            self.state.objects[index].position.z = resting;
            debug!(object = %self.state.objects[index].name, "released object");
        }
        self.state.held = None;
    }

    fn actuate_gripper(&mut self, command: f64) {
        let previous = self.state.finger;
        let travel = self.config.finger_speed * self.config.dt;
        if command < 0. {
            self.release();
            self.state.finger = (previous + travel).min(self.config.finger_limit);
        } else if command > 0. && self.state.held.is_none() {
            let mut finger = (previous - travel).max(0.);
            if let Some((candidate, half_width)) = self.grasp_candidate() {
                if previous >= half_width && finger <= half_width {
                    finger = half_width;
                    self.state.held = Some(candidate);
                    debug!(?candidate, "fingers closed on contact");
                }
            }
            self.state.finger = finger;
        }
        self.state.finger_velocity = (self.state.finger - previous) / self.config.dt;
    }

    fn carry_held_object(&mut self) {
        if let Some(Held::Object(index)) = self.state.held {
            self.state.objects[index].position = self.state.eef;
        }
    }

    fn world_position(&self, position: &Vector3<f64>) -> Vec<f64> {
        self.frame.position_to_world(position).as_slice().to_vec()
    }

    fn world_orientation(&self, orientation: &UnitQuaternion<f64>) -> [f64; 4] {
        quat_to_xyzw(&self.frame.orientation_to_world(orientation))
    }

    fn draw(&self) -> Frame {
        // top-down view of x in [-0.2, 1.0] and y in [-0.6, 0.6] of the robot frame
        let size = FRAME_SIZE as usize;
        let mut rgb = vec![90u8; size * size * 3];
        let pixel = |x: f64, y: f64| -> Option<usize> {
            let column = ((0.6 - y) / 1.2 * size as f64) as isize;
            let row = ((1.0 - x) / 1.2 * size as f64) as isize;
            if (0..size as isize).contains(&column) && (0..size as isize).contains(&row) {
                Some((row as usize * size + column as usize) * 3)
            } else {
                None
            }
        };
        let mut paint = |x: f64, y: f64, color: [u8; 3]| {
            if let Some(index) = pixel(x, y) {
                rgb[index..index + 3].copy_from_slice(&color);
            }
        };
        let appliance = &self.config.appliance;
        let steps = 16;
        let (min, max) = (appliance.interior_min, appliance.interior_max);
        for i in 0..=steps {
            for j in 0..=steps {
                let x = min[0] + (max[0] - min[0]) * i as f64 / steps as f64;
                let y = min[1] + (max[1] - min[1]) * j as f64 / steps as f64;
                paint(x, y, [40, 40, 160]);
            }
        }
        let hinge = self.hinge();
        let handle = self.handle_position();
        for i in 0..=steps {
            let point = hinge + (handle - hinge) * i as f64 / steps as f64;
            paint(point.x, point.y, [200, 200, 200]);
        }
        paint(appliance.button[0], appliance.button[1], [230, 200, 0]);
        for object in &self.state.objects {
            paint(object.position.x, object.position.y, [200, 30, 30]);
        }
        paint(self.state.eef.x, self.state.eef.y, [30, 200, 30]);
        Frame {
            width: FRAME_SIZE,
            height: FRAME_SIZE,
            rgb,
        }
    }
}

impl Default for KinematicSim {
    fn default() -> Self {
        KinematicSim::new(SceneConfig::default())
    }
}

impl Backend for KinematicSim {
    fn step(&mut self, action: &Action) -> ManipulatorResult<()> {
        self.actuate_gripper(action[GRIPPER_CHANNEL]);
        self.move_end_effector(action);
        self.carry_held_object();
        let button = vector(&self.config.appliance.button);
        let near_button = (self.state.eef - button).norm() < self.config.appliance.press_radius;
        if !self.state.button_pressed && near_button {
            self.state.button_pressed = true;
            debug!(timestep = self.state.timestep, "button pressed");
        }
        self.state.timestep += 1;
        Ok(())
    }

    fn render(&mut self) -> ManipulatorResult<()> {
        self.renderer_open = true;
        if self.config.render_frames {
            self.image = Some(self.draw());
        }
        Ok(())
    }

    fn observation(&self) -> ManipulatorResult<Observation> {
        let state = &self.state;
        let time = state.timestep as f64 * self.config.dt;
        let mut observation = Observation::new(state.timestep, time);
        observation.insert(EEF_POS, self.world_position(&state.eef));
        observation.insert(EEF_QUAT, self.world_orientation(&state.orientation));
        observation.insert(GRIPPER_QPOS, [state.finger, -state.finger]);
        observation.insert(GRIPPER_QVEL, [state.finger_velocity, -state.finger_velocity]);
        observation.insert(BASE_POS, self.config.base_position);
        observation.insert(BASE_QUAT, quat_to_xyzw(&self.frame.base().rotation));
        for object in &state.objects {
            let yaw = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), object.yaw.to_radians());
            let position = self.world_position(&object.position);
            observation.insert(entity_key(&object.name, "pos"), position);
            observation.insert(entity_key(&object.name, "quat"), self.world_orientation(&yaw));
        }
        let appliance = &self.config.appliance;
        let name = appliance.name.as_str();
        observation.insert(
            entity_key(name, "pos"),
            self.world_position(&vector(&appliance.floor_center())),
        );
        observation.insert(
            entity_key(name, "quat"),
            self.world_orientation(&UnitQuaternion::identity()),
        );
        observation.insert(entity_key(name, "hinge_pos"), self.world_position(&self.hinge()));
        observation.insert(
            entity_key(name, "handle_pos"),
            self.world_position(&self.handle_position()),
        );
        observation.insert(entity_key(name, "door_angle"), [state.door_angle]);
        observation.insert(
            entity_key(name, "button_pos"),
            self.world_position(&vector(&appliance.button)),
        );
        observation.insert(
            entity_key(name, "button_pressed"),
            [if state.button_pressed { 1. } else { 0. }],
        );
        Ok(observation)
    }

    fn check_success(&self) -> bool {
        self.task_report().succeeded()
    }

    fn close_renderer(&mut self) {
        self.renderer_open = false;
        self.image = None;
    }

    fn reset(&mut self) -> ManipulatorResult<()> {
        self.state = self.initial.clone();
        Ok(())
    }

    fn capture_frame(&self) -> ManipulatorResult<Option<Frame>> {
        if !self.renderer_open {
            return Ok(None);
        }
        Ok(Some(match &self.image {
            Some(image) => image.clone(),
            None => self.draw(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::robot::command_buffer::{Action, ACTION_DIM, GRIPPER_CHANNEL};
    use crate::robot::observation::{GRIPPER_QPOS, GRIPPER_QVEL};
    use crate::robot::robot_frame::RobotFrame;
    use crate::simulation::backend::Backend;
    use crate::simulation::kinematic::KinematicSim;
    use crate::simulation::scene::SceneConfig;
    use nalgebra::Vector3;

    fn action(linear: [f64; 3], gripper: f64) -> Action {
        let mut action = [0.; ACTION_DIM];
        action[0..3].copy_from_slice(&linear);
        action[GRIPPER_CHANNEL] = gripper;
        action
    }

    fn run(sim: &mut KinematicSim, action: Action, steps: usize) {
        for _ in 0..steps {
            sim.step(&action).unwrap();
        }
    }

    #[test]
    fn velocities_are_given_in_the_robot_frame() {
        let mut sim = KinematicSim::default();
        let start = sim.observation().unwrap().eef_position().unwrap();
        run(&mut sim, action([0.2, 0., 0.], 0.), 10);
        let observation = sim.observation().unwrap();
        let moved = observation.eef_position().unwrap() - start;
        // the base is turned by 90 degrees, so robot x is world y
        assert!((moved - Vector3::new(0., 0.1, 0.)).norm() < 1e-9);
        let frame = RobotFrame::from_observation(&observation).unwrap();
        let robot = frame.position_to_robot(&observation.eef_position().unwrap());
        assert!((robot - sim.eef_position()).norm() < 1e-9);
        assert_eq!(observation.timestep, 10);
        assert!((observation.time - 0.5).abs() < 1e-12);
    }

    #[test]
    fn end_effector_stays_in_reach_and_above_counter() {
        let mut sim = KinematicSim::default();
        run(&mut sim, action([0.2, 0., 0.], 0.), 200);
        let center = Vector3::new(0., 0., 0.9);
        assert!((sim.eef_position() - center).norm() <= 1. + 1e-9);
        run(&mut sim, action([0., 0., -0.2], 0.), 200);
        assert!(sim.eef_position().z >= 0.9 - 1e-9);
    }

    #[test]
    fn fingers_open_and_close() {
        let mut sim = KinematicSim::default();
        run(&mut sim, action([0.; 3], -1.), 20);
        let observation = sim.observation().unwrap();
        assert_eq!(observation.get(GRIPPER_QPOS).unwrap(), &[0.04, -0.04]);
        assert_eq!(observation.get(GRIPPER_QVEL).unwrap(), &[0., -0.]);
        sim.step(&action([0.; 3], 1.)).unwrap();
        let qvel = sim.observation().unwrap().gripper_qvel().unwrap();
        assert!(qvel[0] < -0.01);
        run(&mut sim, action([0.; 3], 1.), 20);
        assert_eq!(sim.observation().unwrap().gripper_qpos().unwrap()[0], 0.);
        assert!(sim.held_object().is_none());
    }

    #[test]
    fn grasp_carry_and_release() {
        let mut sim = KinematicSim::default();
        let object = sim.object_position("obj").unwrap();
        run(&mut sim, action([0.; 3], -1.), 10);
        // teleporting through the actions: move onto the object in small steps
        for _ in 0..400 {
            let error = object - sim.eef_position();
            if error.norm() < 1e-3 {
                break;
            }
            let velocity = error / 0.05;
            let velocity = if velocity.norm() > 0.2 {
                velocity.normalize() * 0.2
            } else {
                velocity
            };
            sim.step(&action([velocity.x, velocity.y, velocity.z], 0.)).unwrap();
        }
        run(&mut sim, action([0.; 3], 1.), 10);
        assert_eq!(sim.held_object(), Some("obj"));
        assert_eq!(sim.observation().unwrap().gripper_qpos().unwrap()[0], 0.025);
        run(&mut sim, action([0., 0., 0.2], 1.), 5);
        assert!((sim.object_position("obj").unwrap() - sim.eef_position()).norm() < 1e-12);
        sim.step(&action([0.; 3], -1.)).unwrap();
        assert!(sim.held_object().is_none());
        assert!((sim.object_position("obj").unwrap().z - 0.925).abs() < 1e-12);
    }

    #[test]
    fn door_follows_the_held_handle() {
        let mut sim = KinematicSim::default();
        run(&mut sim, action([0.; 3], -1.), 10);
        let handle = sim.observation().unwrap();
        let frame = RobotFrame::from_observation(&handle).unwrap();
        let handle = frame.position_to_robot(&handle.vector3("microwave_handle_pos").unwrap());
        sim.state.eef = handle;
        run(&mut sim, action([0.; 3], 1.), 10);
        assert!(sim.holds_handle());
        // pull towards the robot
        run(&mut sim, action([-0.1, 0., 0.], 1.), 20);
        assert!(sim.door_angle() > 5.);
        let opened = sim.door_angle();
        run(&mut sim, action([0.; 3], -1.), 2);
        assert!(!sim.holds_handle());
        run(&mut sim, action([-0.1, 0., 0.], 0.), 5);
        assert_eq!(sim.door_angle(), opened);
    }

    #[test]
    fn task_report_and_reset() {
        let mut sim = KinematicSim::new(SceneConfig::default());
        assert!(!sim.check_success());
        let floor = sim.config().appliance.floor_center();
        assert!(sim.place_object("obj", [floor[0], floor[1], floor[2] + 0.025]));
        assert!(!sim.place_object("cup", [0.; 3]));
        sim.state.button_pressed = true;
        let report = sim.task_report();
        assert!(report.object_in_appliance);
        assert!(report.door_closed);
        assert!(report.gripper_clear);
        assert!(sim.check_success());
        sim.reset().unwrap();
        assert!(!sim.check_success());
        assert!(!sim.button_pressed());
    }

    #[test]
    fn frames_until_renderer_closed() {
        let mut sim = KinematicSim::default();
        sim.render().unwrap();
        let frame = sim.capture_frame().unwrap().unwrap();
        assert_eq!(frame.rgb.len(), (frame.width * frame.height * 3) as usize);
        sim.close_renderer();
        assert!(sim.capture_frame().unwrap().is_none());
    }
}
