// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later
use std::time::Duration;

use tracing::{debug, warn};

use crate::exception::{ManipulatorException, ManipulatorResult};
use crate::robot::command_buffer::CommandGuard;
use crate::robot::control_tools::StallDetector;
use crate::robot::control_types::VelocityCommand;
use crate::robot::logger::Logger;
use crate::robot::motion_config::MotionConfig;
use crate::robot::observation::Observation;
use crate::simulation::SimulationHandle;
use crate::Finishable;

/// Runs a control callback once per published observation until it reports that the motion
/// is finished, stalls or exhausts its tick budget.
///
/// The callback receives the observation and the simulated time elapsed since the loop
/// started. The command guard is held for the lifetime of the loop, so all motion channels are
/// zeroed once the loop is dropped.
pub(crate) struct ControlLoop<'a, F>
where
    F: FnMut(&Observation, &Duration) -> ManipulatorResult<VelocityCommand>,
{
    name: &'a str,
    handle: &'a SimulationHandle,
    guard: CommandGuard<'a>,
    logger: &'a mut Logger,
    motion_callback: F,
    max_ticks: usize,
    stall: StallDetector,
}

impl<'a, F> ControlLoop<'a, F>
where
    F: FnMut(&Observation, &Duration) -> ManipulatorResult<VelocityCommand>,
{
    pub fn new(
        name: &'a str,
        handle: &'a SimulationHandle,
        logger: &'a mut Logger,
        config: &MotionConfig,
        motion_callback: F,
    ) -> Self {
        ControlLoop {
            name,
            handle,
            guard: handle.commands().acquire(),
            logger,
            motion_callback,
            max_ticks: config.max_ticks,
            stall: StallDetector::new(config.stall_ticks, config.stall_progress),
        }
    }

    /// Runs the loop.
    ///
    /// # Errors
    /// * ConvergenceFailure if the loop stalled or ran out of ticks.
    /// * Any error of the callback or of the simulation driver.
    pub fn run(&mut self) -> ManipulatorResult<()> {
        let (_, mut sequence) = self.handle.latest();
        let mut start_time: Option<f64> = None;
        let mut ticks = 0;
        loop {
            let (observation, next) = self.handle.next_observation(sequence)?;
            sequence = next;
            let start = *start_time.get_or_insert(observation.time);
            let elapsed = Duration::from_secs_f64((observation.time - start).max(0.));
            let command = (self.motion_callback)(&observation, &elapsed)?;
            self.logger.log(&observation, &command);
            self.guard.apply(&command);
            if command.is_finished() {
                debug!(loop_name = self.name, ticks, "control loop finished");
                return Ok(());
            }
            ticks += 1;
            if ticks >= self.max_ticks {
                return Err(self.give_up(format!(
                    "{}: no convergence within {} ticks",
                    self.name, self.max_ticks
                )));
            }
            if let Some(residual) = command.residual {
                if self.stall.update(residual) {
                    return Err(self.give_up(format!(
                        "{}: stalled with residual {:.4}",
                        self.name, residual
                    )));
                }
            }
        }
    }

    fn give_up(&mut self, message: String) -> ManipulatorException {
        warn!("{}", message);
        ManipulatorException::ConvergenceFailure {
            message,
            log: Some(self.logger.records()),
        }
    }
}

/// Turns the outcome of a control loop into the boolean result of a primitive.
///
/// A [`ConvergenceFailure`](`ManipulatorException::ConvergenceFailure`) becomes `Ok(false)`,
/// its message is stored in `last_failure`. Every other error is passed on.
pub(crate) fn into_outcome(
    result: ManipulatorResult<()>,
    last_failure: &mut Option<String>,
) -> ManipulatorResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(ManipulatorException::ConvergenceFailure { message, .. }) => {
            *last_failure = Some(message);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
