// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the tuning constants of the primitive motion controller.
use serde::Deserialize;
use serde::Serialize;

/// Speed tiers, tolerances and budgets of the primitive routines.
///
/// Every tier is a step function: above the upper threshold the fast speed is used, above the
/// lower threshold the slow speed, otherwise zero. A value exactly on a threshold falls into the
/// lower tier.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(default)]
pub struct MotionConfig {
    /// Translational speed used far away from the target in \[m/s\].
    pub max_velocity: f64,
    /// Translational speed used close to the target in \[m/s\].
    pub min_velocity: f64,
    /// Fast rotational rate.
    pub max_angle_velocity: f64,
    /// Slow rotational rate.
    pub min_angle_velocity: f64,

    /// `move_to` finishes once every axis is within this distance of the target in \[m\].
    pub position_tolerance: f64,
    /// Distances above this use `max_velocity`.
    pub slow_down_distance: f64,
    /// Distances above this and up to `slow_down_distance` use `min_velocity`.
    pub stop_distance: f64,

    /// Angle errors above this use `max_angle_velocity` in \[deg\].
    pub fast_angle: f64,
    /// Angle errors above this and up to `fast_angle` use `min_angle_velocity` in \[deg\].
    pub slow_angle: f64,
    /// `rotate_to` finishes once every axis is within this angle of the target in \[deg\].
    pub angle_tolerance: f64,
    /// `rotate_axis` finishes once the remaining rotation vector is shorter than this in \[rad\].
    pub rotation_vector_tolerance: f64,

    /// Both fingers have to pass this joint position for the gripper to count as open in \[m\].
    pub gripper_open_threshold: f64,
    /// Finger speeds above this count as moving in \[m/s\].
    pub gripper_velocity_threshold: f64,
    /// Finger openings below this count as fully closed in \[m\].
    pub gripper_closed_width: f64,
    /// Ticks `close_gripper` waits for the fingers to start moving.
    pub gripper_onset_ticks: usize,

    /// `lower_until_settled` finishes once the object moved less than this during one tick in \[m\].
    pub settle_distance: f64,

    /// Every control loop gives up after this many ticks.
    pub max_ticks: usize,
    /// A loop whose residual did not improve by `stall_progress` during this many ticks stalls.
    pub stall_ticks: usize,
    pub stall_progress: f64,

    /// Centre of the reachable sphere in the robot frame in \[m\].
    pub workspace_center: [f64; 3],
    /// Radius of the reachable sphere in \[m\].
    pub workspace_radius: f64,

    /// Number of control records kept for failure reports.
    pub log_size: usize,
}

impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            max_velocity: 0.2,
            min_velocity: 0.02,
            max_angle_velocity: 0.1,
            min_angle_velocity: 0.01,
            position_tolerance: 0.02,
            slow_down_distance: 0.02,
            stop_distance: 0.002,
            fast_angle: 5.,
            slow_angle: 2.,
            angle_tolerance: 0.5,
            rotation_vector_tolerance: 0.1,
            gripper_open_threshold: 0.0395,
            gripper_velocity_threshold: 0.01,
            gripper_closed_width: 0.004,
            gripper_onset_ticks: 10,
            settle_distance: 1e-4,
            max_ticks: 4000,
            stall_ticks: 40,
            stall_progress: 1e-4,
            workspace_center: [0., 0., 0.9],
            workspace_radius: 1.,
            log_size: 50,
        }
    }
}
