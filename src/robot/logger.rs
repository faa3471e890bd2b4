// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the logging type definitions for [`ConvergenceFailure`](`crate::exception::ManipulatorException::ConvergenceFailure`)
use std::collections::VecDeque;

use serde::Serialize;

use crate::robot::control_types::VelocityCommand;
use crate::robot::observation::Observation;

/// One row of the log contains the end-effector position observed at step n and the command
/// the control loop answered with.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Record {
    /// Simulation step the command reacted to.
    pub timestep: u64,
    /// Simulated time of that step in \[s\].
    pub time: f64,
    /// World frame end-effector position, if the observation contained one.
    pub eef_position: Option<[f64; 3]>,
    /// Command computed for this step.
    pub command: VelocityCommand,
}

impl Record {
    /// creates a string representation based on the debug formatter
    pub fn log(&self) -> String {
        format!("{:?}", self)
    }
}

pub(crate) struct Logger {
    records: VecDeque<Record>,
    log_size: usize,
}

impl Logger {
    pub fn new(log_size: usize) -> Self {
        Logger {
            records: VecDeque::with_capacity(log_size),
            log_size,
        }
    }
    pub fn log(&mut self, observation: &Observation, command: &VelocityCommand) {
        if self.log_size == 0 {
            return;
        }
        if self.records.len() == self.log_size {
            self.records.pop_front();
        }
        self.records.push_back(Record {
            timestep: observation.timestep,
            time: observation.time,
            eef_position: observation
                .eef_position()
                .ok()
                .map(|position| [position.x, position.y, position.z]),
            command: *command,
        });
    }
    /// Returns the stored records, oldest first, without clearing them.
    pub fn records(&self) -> Vec<Record> {
        self.records.iter().cloned().collect()
    }
}
