// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains exception and Result definitions
use crate::robot::logger::Record;
use thiserror::Error;

/// Represents all kinds of errors the control core can report.
///
/// A primitive that simply does not reach its goal is not an error: it returns `Ok(false)`.
/// [`ConvergenceFailure`](`ManipulatorException::ConvergenceFailure`) only exists to carry the
/// control log of such a run out of the control loop.
#[derive(Error, Debug)]
pub enum ManipulatorException {
    /// InvalidArgument is returned before any command is written, e.g. for an orientation with
    /// the wrong number of values or an unknown approach direction.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// ResolutionFailure is returned if a named entity is not part of the current scene.
    #[error("could not resolve {name:?}: observation has no entry {key:?}")]
    ResolutionFailure {
        /// Name of the entity that was looked up.
        name: String,
        /// Observation key that was missing or malformed.
        key: String,
    },

    /// ConvergenceFailure describes a control loop that stalled or ran out of ticks.
    /// The exception holds the last control records. The number of recorded
    /// records can be configured with [`MotionConfig::log_size`](`crate::MotionConfig::log_size`).
    #[error("{message}")]
    ConvergenceFailure {
        /// Explanatory string.
        message: String,
        /// Records logged just before the loop gave up.
        log: Option<Vec<Record>>,
    },

    /// BackendFailure is returned if the physics backend failed during step, render or reset.
    #[error("backend failure: {message}")]
    BackendFailure { message: String },

    /// SimulationStopped is returned to a primitive that waits for an observation while the
    /// driver thread is no longer running.
    #[error("simulation is not running (task succeeded: {succeeded})")]
    SimulationStopped { succeeded: bool },

    /// ConfigException is returned if a configuration file cannot be read or parsed.
    #[error("{message:?}")]
    ConfigException { message: String },
}

/// creates an InvalidArgument exception from anything that converts into a String
pub(crate) fn create_invalid_argument(message: impl Into<String>) -> ManipulatorException {
    ManipulatorException::InvalidArgument {
        message: message.into(),
    }
}

/// creates a BackendFailure exception from anything that converts into a String
pub(crate) fn create_backend_failure(message: impl Into<String>) -> ManipulatorException {
    ManipulatorException::BackendFailure {
        message: message.into(),
    }
}

/// Result type which can have ManipulatorException as Error
pub type ManipulatorResult<T> = Result<T, ManipulatorException>;
