// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! # mobile-manipulator
//! mobile-manipulator drives a simulated single-arm mobile manipulator through manipulation tasks
//! like grasping, opening doors, pressing buttons and placing objects. Every motion is closed-loop
//! velocity control computed against the latest simulator observation.
//!
//! ## Design
//! The library is divided into these main modules:
//! * [simulation](`crate::simulation`) - steps a physics [`Backend`] on its own thread and publishes
//!   observations. Contains the built-in [`KinematicSim`](`crate::simulation::kinematic::KinematicSim`).
//! * [robot](`crate::robot`) - frames, observations, the shared command buffer and the
//!   primitive routines of the [`MotionController`].
//! * [gripper](`crate::gripper`) - opening, closing and classifying the gripper.
//! * [skills](`crate::skills`) - composes primitives into manipulation skills.
//! * [tools](`crate::tools`) - the typed menu of operations for an external tool-calling client.
//!
//! All positions handed to the controller are given in the robot frame.
//!
//! # Example:
//!```no_run
//! use manipulator::simulation::kinematic::KinematicSim;
//! use manipulator::{Manipulator, ManipulatorConfig, ManipulatorResult, PlacementOffsets, Simulation};
//! fn main() -> ManipulatorResult<()> {
//!     let config = ManipulatorConfig::default();
//!     let mut simulation = Simulation::new(KinematicSim::default(), config.simulation)?;
//!     simulation.start()?;
//!     let mut manipulator = Manipulator::from_config(simulation.handle(), &config);
//!     let offsets = PlacementOffsets { height_offset: 0.04, front_offset: 0. };
//!     let done = manipulator.open_door()?
//!         && manipulator.grip_object_from_above("obj")?
//!         && manipulator.place_object_at_destination("obj", Some("microwave"), offsets)?
//!         && manipulator.close_door()?
//!         && manipulator.press_button()?;
//!     println!("sequence finished: {}, task succeeded: {}", done, simulation.task_succeeded());
//!     simulation.stop()
//! }
//! ```
//!
//! Every routine returns a `ManipulatorResult<bool>`. `Ok(false)` means the routine did not reach
//! its goal, e.g. because the target is out of reach or the motion stalled. Errors are reserved
//! for invalid arguments, unknown objects, backend failures and a stopped simulation.
//!
//! ```no_run
//! # use manipulator::simulation::kinematic::KinematicSim;
//! # use manipulator::{ManipulatorResult, MotionConfig, MotionController, Simulation, SimulationConfig};
//! # use nalgebra::Vector3;
//! # fn main() -> ManipulatorResult<()> {
//! # let mut simulation = Simulation::new(KinematicSim::default(), SimulationConfig::default())?;
//! # simulation.start()?;
//! let mut controller = MotionController::new(simulation.handle(), MotionConfig::default());
//! if !controller.move_to(&Vector3::new(0.4, 0.1, 1.0))? {
//!     println!("move_to failed: {:?}", controller.last_failure());
//! }
//! # Ok(())
//! # }
//! ```
//! The primitives take the command buffer for the duration of the call and zero its motion
//! channels before they return.
pub mod config;
pub mod exception;
pub mod gripper;
pub mod robot;
pub mod simulation;
pub mod skills;
pub mod tools;
pub mod utils;

pub use config::ManipulatorConfig;
pub use exception::{ManipulatorException, ManipulatorResult};
pub use gripper::gripper_state::{GripperState, GripperStatus};
pub use robot::control_types::*;
pub use robot::motion_config::MotionConfig;
pub use robot::motion_controller::MotionController;
pub use robot::observation::Observation;
pub use robot::resolver::ObjectPose;
pub use robot::robot_frame::RobotFrame;
pub use simulation::{Backend, Simulation, SimulationConfig, SimulationHandle};
pub use skills::approach::ApproachDirection;
pub use skills::{Manipulator, PlacementOffsets, SkillConfig};
pub use tools::{ToolCall, ToolOutput};
pub use utils::*;
