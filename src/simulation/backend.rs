// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the interface every physics backend has to provide.
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

use crate::exception::ManipulatorResult;
use crate::robot::command_buffer::Action;
use crate::robot::observation::Observation;

/// An RGB image rendered by the backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB bytes, `width * height * 3` of them.
    pub rgb: Vec<u8>,
}

/// Physics and rendering engine driven by the [`Simulation`](`crate::Simulation`).
#[cfg_attr(test, automock)]
pub trait Backend {
    /// Applies the full action vector and advances the simulation by one step.
    fn step(&mut self, action: &Action) -> ManipulatorResult<()>;
    /// Renders the current state.
    fn render(&mut self) -> ManipulatorResult<()>;
    /// Returns a snapshot of the current state.
    fn observation(&self) -> ManipulatorResult<Observation>;
    /// Evaluates the task-specific success predicate.
    fn check_success(&self) -> bool;
    /// Releases rendering resources.
    fn close_renderer(&mut self);
    /// Puts the scene back into its initial state.
    fn reset(&mut self) -> ManipulatorResult<()>;
    /// Returns the last rendered frame, if the backend renders images at all.
    fn capture_frame(&self) -> ManipulatorResult<Option<Frame>> {
        Ok(None)
    }
}
