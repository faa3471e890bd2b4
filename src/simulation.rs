// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the Simulation driver which steps a [`Backend`] on its own thread.
//!
//! Each tick the driver reads the whole [`CommandBuffer`], steps and renders the backend,
//! publishes the new [`Observation`] and evaluates the success predicate. Primitives on the
//! caller thread block on [`SimulationHandle::next_observation`] instead of polling.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::exception::{create_backend_failure, ManipulatorException, ManipulatorResult};
use crate::robot::command_buffer::{Action, CommandBuffer, ACTION_DIM};
use crate::robot::observation::Observation;

pub mod backend;
pub mod kinematic;
pub mod scene;

pub use backend::{Backend, Frame};

/// Pacing and termination behaviour of the driver thread.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Minimum wall-clock duration of one tick. "None" steps as fast as possible.
    pub tick_period: Option<Duration>,
    /// After publishing an observation the driver waits up to this long for the caller to
    /// answer with a new command. "None" disables lockstep.
    pub lockstep_timeout: Option<Duration>,
    /// Ends the driver loop once the success predicate holds.
    pub stop_on_success: bool,
    /// How long a primitive waits for the next observation before reporting a failure.
    pub observation_timeout: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            tick_period: None,
            lockstep_timeout: Some(Duration::from_millis(20)),
            stop_on_success: true,
            observation_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
struct Snapshot {
    observation: Arc<Observation>,
    sequence: u64,
}

#[derive(Debug)]
struct Shared {
    commands: CommandBuffer,
    snapshot: Mutex<Snapshot>,
    published: Condvar,
    running: AtomicBool,
    succeeded: AtomicBool,
    failure: Mutex<Option<String>>,
    observation_timeout: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn publish(&self, observation: Observation) {
        let mut snapshot = lock(&self.snapshot);
        snapshot.observation = Arc::new(observation);
        snapshot.sequence += 1;
        drop(snapshot);
        self.published.notify_all();
    }

    fn wake(&self) {
        let _snapshot = lock(&self.snapshot);
        self.published.notify_all();
    }

    fn fail(&self, message: String) {
        *lock(&self.failure) = Some(message);
    }
}

/// Cloneable access to the command buffer and the latest observation.
#[derive(Debug, Clone)]
pub struct SimulationHandle {
    shared: Arc<Shared>,
}

impl SimulationHandle {
    pub fn commands(&self) -> &CommandBuffer {
        &self.shared.commands
    }

    /// Returns the latest observation together with its sequence number.
    pub fn latest(&self) -> (Arc<Observation>, u64) {
        let snapshot = lock(&self.shared.snapshot);
        (snapshot.observation.clone(), snapshot.sequence)
    }

    pub fn observation(&self) -> Arc<Observation> {
        self.latest().0
    }

    /// Blocks until an observation newer than `after` was published.
    ///
    /// # Errors
    /// * BackendFailure if the backend failed or no observation arrived in time.
    /// * SimulationStopped if the driver is not running.
    pub fn next_observation(&self, after: u64) -> ManipulatorResult<(Arc<Observation>, u64)> {
        let timeout = self.shared.observation_timeout;
        let deadline = Instant::now() + timeout;
        let mut snapshot = lock(&self.shared.snapshot);
        loop {
            if snapshot.sequence > after {
                return Ok((snapshot.observation.clone(), snapshot.sequence));
            }
            if let Some(message) = self.failure() {
                return Err(create_backend_failure(message));
            }
            if !self.is_running() {
                return Err(ManipulatorException::SimulationStopped {
                    succeeded: self.task_succeeded(),
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(create_backend_failure(format!(
                    "no observation within {:?}",
                    timeout
                )));
            }
            snapshot = self
                .shared
                .published
                .wait_timeout(snapshot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Value of the success predicate after the last step.
    pub fn task_succeeded(&self) -> bool {
        self.shared.succeeded.load(Ordering::SeqCst)
    }

    /// Message of the backend failure that ended the driver, if any.
    pub fn failure(&self) -> Option<String> {
        lock(&self.shared.failure).clone()
    }
}

/// Owns a [`Backend`] and the thread that steps it.
pub struct Simulation<B: Backend + Send + 'static> {
    backend: Arc<Mutex<B>>,
    handle: SimulationHandle,
    config: SimulationConfig,
    thread: Option<JoinHandle<()>>,
}

impl<B: Backend + Send + 'static> Simulation<B> {
    /// Wraps a backend. The driver thread is not started yet, but the initial observation is
    /// already available through the handle.
    ///
    /// # Errors
    /// * BackendFailure if the backend cannot produce an observation.
    pub fn new(backend: B, config: SimulationConfig) -> ManipulatorResult<Self> {
        let initial = backend.observation()?;
        let shared = Shared {
            commands: CommandBuffer::new(),
            snapshot: Mutex::new(Snapshot {
                observation: Arc::new(initial),
                sequence: 0,
            }),
            published: Condvar::new(),
            running: AtomicBool::new(false),
            succeeded: AtomicBool::new(false),
            failure: Mutex::new(None),
            observation_timeout: config.observation_timeout,
        };
        Ok(Simulation {
            backend: Arc::new(Mutex::new(backend)),
            handle: SimulationHandle {
                shared: Arc::new(shared),
            },
            config,
            thread: None,
        })
    }

    pub fn handle(&self) -> SimulationHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Spawns the driver thread. Does nothing if it is already running.
    /// # Errors
    /// * BackendFailure if the thread cannot be spawned.
    pub fn start(&mut self) -> ManipulatorResult<()> {
        if self.is_running() {
            warn!("simulation is already running");
            return Ok(());
        }
        self.join_driver()?;
        let shared = self.handle.shared.clone();
        shared.succeeded.store(false, Ordering::SeqCst);
        *lock(&shared.failure) = None;
        shared.running.store(true, Ordering::SeqCst);
        let backend = self.backend.clone();
        let config = self.config;
        let thread = thread::Builder::new()
            .name("simulation-driver".to_string())
            .spawn(move || drive(backend, shared, config))
            .map_err(|e| {
                self.handle.shared.running.store(false, Ordering::SeqCst);
                create_backend_failure(e.to_string())
            })?;
        self.thread = Some(thread);
        info!("simulation started");
        Ok(())
    }

    /// Signals the driver to stop, waits until its thread exited, then closes the renderer and
    /// resets the backend.
    ///
    /// # Errors
    /// * BackendFailure if the driver ended because of a backend failure, or if the reset failed.
    pub fn stop(&mut self) -> ManipulatorResult<()> {
        self.handle.shared.running.store(false, Ordering::SeqCst);
        self.handle.shared.wake();
        let joined = self.join_driver();
        let (reset, observation) = {
            let mut backend = lock(&self.backend);
            backend.close_renderer();
            let reset = backend.reset();
            (reset, backend.observation())
        };
        self.handle.commands().write([0.; ACTION_DIM]);
        if let Ok(observation) = observation {
            self.handle.shared.publish(observation);
        }
        info!("simulation stopped");
        joined?;
        reset?;
        match self.handle.failure() {
            Some(message) => Err(create_backend_failure(message)),
            None => Ok(()),
        }
    }

    fn join_driver(&mut self) -> ManipulatorResult<()> {
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| create_backend_failure("simulation driver thread panicked"))?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    pub fn task_succeeded(&self) -> bool {
        self.handle.task_succeeded()
    }

    /// Runs `f` with exclusive access to the backend. Blocks the driver while `f` runs.
    ///
    /// The observation of the modified backend is published right away, so queries through the
    /// handle see the change without waiting for the next step.
    pub fn with_backend<R, F: FnOnce(&mut B) -> R>(&self, f: F) -> R {
        let mut backend = lock(&self.backend);
        let result = f(&mut backend);
        match backend.observation() {
            Ok(observation) => self.handle.shared.publish(observation),
            Err(e) => warn!("cannot republish observation: {}", e),
        }
        result
    }

    /// Returns the current rendered frame for external logging.
    pub fn capture_frame(&self) -> ManipulatorResult<Option<Frame>> {
        lock(&self.backend).capture_frame()
    }

    /// Returns the latest observation as JSON for external logging.
    pub fn snapshot_json(&self) -> ManipulatorResult<String> {
        serde_json::to_string(&*self.handle.observation())
            .map_err(|e| create_backend_failure(e.to_string()))
    }
}

impl<B: Backend + Send + 'static> Drop for Simulation<B> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.stop() {
                warn!("simulation stopped with error: {}", e);
            }
        }
    }
}

fn wait_for_next_cycle(start_time: Instant, period: Duration) {
    let time_passed = Instant::now() - start_time;
    if time_passed < period {
        thread::sleep(period - time_passed);
    }
}

fn step_once<B: Backend>(
    backend: &mut B,
    action: &Action,
) -> ManipulatorResult<(Observation, bool)> {
    backend.step(action)?;
    backend.render()?;
    let observation = backend.observation()?;
    Ok((observation, backend.check_success()))
}

fn drive<B: Backend>(backend: Arc<Mutex<B>>, shared: Arc<Shared>, config: SimulationConfig) {
    debug!("simulation driver thread running");
    while shared.running.load(Ordering::SeqCst) {
        let start_time = Instant::now();
        let action = shared.commands.read();
        // publish under the backend lock, like `with_backend` does
        let outcome = {
            let mut backend = lock(&backend);
            step_once(&mut *backend, &action).map(|(observation, succeeded)| {
                let timestep = observation.timestep;
                let generation = shared.commands.generation();
                shared.succeeded.store(succeeded, Ordering::SeqCst);
                shared.publish(observation);
                (timestep, generation, succeeded)
            })
        };
        match outcome {
            Ok((timestep, generation, succeeded)) => {
                if succeeded && config.stop_on_success {
                    info!(timestep, "task succeeded, stopping simulation");
                    break;
                }
                if let Some(timeout) = config.lockstep_timeout {
                    shared.commands.wait_for_write(generation, timeout);
                }
            }
            Err(e) => {
                error!("backend failed, stopping simulation: {}", e);
                shared.fail(e.to_string());
                break;
            }
        }
        if let Some(period) = config.tick_period {
            wait_for_next_cycle(start_time, period);
        }
    }
    shared.running.store(false, Ordering::SeqCst);
    shared.wake();
    debug!("simulation driver thread exited");
}
