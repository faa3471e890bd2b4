// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the velocity command buffer shared between the caller thread and the
//! simulation driver.
//!
//! The buffer always hands out and accepts the whole action vector under one lock, so the
//! driver can never observe a partially written command.
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::robot::control_types::VelocityCommand;

/// Number of actuation channels of an action.
pub const ACTION_DIM: usize = 12;
/// First translational velocity channel. Channels 0-2 hold x, y and z velocity in the robot frame.
pub const TRANSLATION_OFFSET: usize = 0;
/// First rotational velocity channel. Channels 3-5 hold roll, pitch and yaw rates.
pub const ROTATION_OFFSET: usize = 3;
/// Gripper channel: -1 opens, +1 closes, 0 holds the fingers where they are.
pub const GRIPPER_CHANNEL: usize = 6;

/// Full actuation vector applied to the backend on every step.
/// Channels 7-11 belong to the mobile base and torso and stay zero.
pub type Action = [f64; ACTION_DIM];

#[derive(Debug)]
struct Slot {
    action: Action,
    generation: u64,
}

/// Guarded single-slot holder of the current [`Action`].
///
/// Every write bumps a generation counter, which the driver uses to run in lockstep with the
/// caller.
#[derive(Debug)]
pub struct CommandBuffer {
    slot: Mutex<Slot>,
    written: Condvar,
}

impl Default for CommandBuffer {
    fn default() -> Self {
        CommandBuffer::new()
    }
}

impl CommandBuffer {
    pub fn new() -> Self {
        CommandBuffer {
            slot: Mutex::new(Slot {
                action: [0.; ACTION_DIM],
                generation: 0,
            }),
            written: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of the current action.
    pub fn read(&self) -> Action {
        self.lock().action
    }

    /// Number of writes since the buffer was created.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Replaces the whole action.
    pub fn write(&self, action: Action) {
        self.update(|current| *current = action);
    }

    /// Atomically modifies the action in place.
    pub fn update<F: FnOnce(&mut Action)>(&self, modify: F) {
        let mut slot = self.lock();
        modify(&mut slot.action);
        slot.generation += 1;
        drop(slot);
        self.written.notify_all();
    }

    /// Zeroes every channel except the gripper channel, which keeps its last command so a
    /// grasp is held between primitives.
    pub fn zero_motion(&self) {
        self.update(|action| {
            for (channel, value) in action.iter_mut().enumerate() {
                if channel != GRIPPER_CHANNEL {
                    *value = 0.;
                }
            }
        });
    }

    /// Blocks until a write newer than `generation` happened or `timeout` elapsed.
    /// Returns the generation observed last.
    pub fn wait_for_write(&self, generation: u64, timeout: Duration) -> u64 {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        while slot.generation <= generation {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            slot = self
                .written
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        slot.generation
    }

    /// Grants write access for the duration of one primitive.
    ///
    /// The returned guard zeroes all motion channels when it is dropped, whether the primitive
    /// succeeded, failed or returned early with an error.
    pub fn acquire(&self) -> CommandGuard<'_> {
        CommandGuard { buffer: self }
    }
}

/// Write access to a [`CommandBuffer`] held by the running primitive.
#[derive(Debug)]
pub struct CommandGuard<'a> {
    buffer: &'a CommandBuffer,
}

impl<'a> CommandGuard<'a> {
    /// Writes all velocity channels of `command` and, if it carries one, the gripper command.
    pub fn apply(&self, command: &VelocityCommand) {
        self.buffer.update(|action| command.write_into(action));
    }
}

impl<'a> Drop for CommandGuard<'a> {
    fn drop(&mut self) {
        self.buffer.zero_motion();
    }
}

#[cfg(test)]
mod tests {
    use crate::robot::command_buffer::{CommandBuffer, ACTION_DIM, GRIPPER_CHANNEL};
    use crate::robot::control_types::VelocityCommand;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn concurrent_writes_are_never_torn() {
        let buffer = Arc::new(CommandBuffer::new());
        let done = Arc::new(AtomicBool::new(false));
        let writers: Vec<_> = (1..=4)
            .map(|id| {
                let buffer = buffer.clone();
                thread::spawn(move || {
                    for _ in 0..5000 {
                        buffer.write([id as f64; ACTION_DIM]);
                    }
                })
            })
            .collect();
        let reader = {
            let buffer = buffer.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut reads = 0;
                while !done.load(Ordering::SeqCst) || reads == 0 {
                    let action = buffer.read();
                    assert!(action.iter().all(|value| *value == action[0]));
                    reads += 1;
                }
            })
        };
        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);
        reader.join().unwrap();
        assert_eq!(buffer.generation(), 4 * 5000);
    }

    #[test]
    fn guard_zeroes_motion_on_drop() {
        let buffer = CommandBuffer::new();
        {
            let guard = buffer.acquire();
            let command = VelocityCommand::new([0.1, 0.2, 0.3], [0.01, 0.02, 0.03]);
            guard.apply(&command.with_gripper(1.));
            let action = buffer.read();
            assert_eq!(action[0..6], [0.1, 0.2, 0.3, 0.01, 0.02, 0.03]);
            assert_eq!(action[GRIPPER_CHANNEL], 1.);
        }
        let action = buffer.read();
        assert!(action[0..6].iter().all(|value| *value == 0.));
        assert_eq!(action[GRIPPER_CHANNEL], 1.);
        assert!(action[7..].iter().all(|value| *value == 0.));
    }

    #[test]
    fn guard_zeroes_on_early_return() {
        fn failing(buffer: &CommandBuffer) -> Result<(), ()> {
            let guard = buffer.acquire();
            guard.apply(&VelocityCommand::linear([0.2, 0., 0.]));
            let stalled: Result<(), ()> = Err(());
            stalled?;
            Ok(())
        }
        let buffer = CommandBuffer::new();
        assert!(failing(&buffer).is_err());
        assert_eq!(buffer.read()[0], 0.);
    }

    #[test]
    fn wait_for_write_wakes_up() {
        let buffer = Arc::new(CommandBuffer::new());
        let generation = buffer.generation();
        let writer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                buffer.write([1.; ACTION_DIM]);
            })
        };
        let seen = buffer.wait_for_write(generation, Duration::from_secs(5));
        assert!(seen > generation);
        writer.join().unwrap();
        // times out without a writer
        let seen_again = buffer.wait_for_write(seen, Duration::from_millis(5));
        assert_eq!(seen_again, seen);
    }
}
