// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! contains useful type definitions and conversion functions.
//!
//! Euler angles are always given in degrees and follow the extrinsic x-y-z convention
//! (roll about the fixed x axis, then pitch about y, then yaw about z).
//! Quaternions exchanged with the observation use the x-y-z-w order.
use crate::exception::{create_invalid_argument, ManipulatorResult};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};

/// Builds a unit quaternion from four values in x-y-z-w order.
///
/// # Errors
/// * InvalidArgument if not exactly four values are given or if their norm is zero.
pub fn quat_from_xyzw(values: &[f64]) -> ManipulatorResult<UnitQuaternion<f64>> {
    if values.len() != 4 {
        return Err(create_invalid_argument(format!(
            "a quaternion needs 4 values, got {}",
            values.len()
        )));
    }
    let quaternion = Quaternion::new(values[3], values[0], values[1], values[2]);
    if quaternion.norm() < 1e-9 || !quaternion.norm().is_finite() {
        return Err(create_invalid_argument(format!(
            "{:?} is not a valid rotation",
            values
        )));
    }
    Ok(UnitQuaternion::from_quaternion(quaternion))
}

/// Returns the four components of a unit quaternion in x-y-z-w order.
pub fn quat_to_xyzw(quaternion: &UnitQuaternion<f64>) -> [f64; 4] {
    let q = quaternion.quaternion();
    [q.i, q.j, q.k, q.w]
}

/// converts a quaternion to extrinsic x-y-z Euler angles in degrees
pub fn quat_to_euler(quaternion: &UnitQuaternion<f64>) -> Vector3<f64> {
    let (roll, pitch, yaw) = quaternion.euler_angles();
    Vector3::new(roll, pitch, yaw).map(f64::to_degrees)
}

/// converts extrinsic x-y-z Euler angles in degrees to a quaternion
pub fn euler_to_quat(euler: &Vector3<f64>) -> UnitQuaternion<f64> {
    let radians = euler.map(f64::to_radians);
    UnitQuaternion::from_euler_angles(radians.x, radians.y, radians.z)
}

/// Parses an orientation given either as three Euler angles in degrees or as a quaternion in
/// x-y-z-w order.
///
/// # Errors
/// * InvalidArgument for any other number of values.
pub fn orientation_from_slice(values: &[f64]) -> ManipulatorResult<UnitQuaternion<f64>> {
    match values.len() {
        3 => Ok(euler_to_quat(&Vector3::new(values[0], values[1], values[2]))),
        4 => quat_from_xyzw(values),
        n => Err(create_invalid_argument(format!(
            "an orientation needs 3 Euler angles or 4 quaternion values, got {}",
            n
        ))),
    }
}

/// Signed difference `a - b` of two angles in degrees, wrapped to \[-180, 180).
pub fn subtract_angles(a: f64, b: f64) -> f64 {
    (a - b + 180.).rem_euclid(360.) - 180.
}
