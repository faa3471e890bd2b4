// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the robot side of the control loop: frames, observations, the command buffer and
//! the primitive routines of the [`MotionController`](`motion_controller::MotionController`).

pub mod command_buffer;
mod control_loop;
mod control_tools;
pub mod control_types;
pub mod logger;
pub mod motion_config;
pub mod motion_controller;
pub mod observation;
pub mod resolver;
pub mod robot_frame;
