// Dual-actuator coordinator
//
// Drives the left and right wheel actuators together: set targets, poll both
// until each reports arrival, stop, re-zero. All targets are relative to the
// position at the start of the current command.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::error::{MotionError, Result};

/// Handle to one stepper-style wheel actuator.
///
/// Implementations run asynchronously toward their target; the coordinator
/// only sequences them.
pub trait Actuator {
    fn set_target(&mut self, steps: i64);

    fn set_max_speed(&mut self, speed: f32);

    /// Constant speed used by `run_speed`
    fn set_speed(&mut self, speed: f32);

    /// Move toward the target. Returns `Ok(true)` while still moving.
    fn advance(&mut self) -> Result<bool>;

    /// Move at the constant speed, ignoring the target
    fn run_speed(&mut self) -> Result<()>;

    /// Stop as quickly as possible. Must be safe to call repeatedly.
    fn stop(&mut self);

    /// Redefine the current position (re-zero the reference frame)
    fn set_current_position(&mut self, steps: i64);

    fn state(&self) -> ActuatorState;
}

/// Snapshot of one actuator
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorState {
    pub position: i64,
    pub target: i64,
    pub max_speed: f32,
    pub speed: f32,
}

impl ActuatorState {
    pub fn remaining(&self) -> i64 {
        self.target - self.position
    }
}

/// Shared flag used to stop a coordinated run from outside the control sequence
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Bounds on a coordinated run. The default is unbounded: block until both
/// actuators arrive, however long that takes.
#[derive(Debug, Clone, Default)]
pub struct RunLimits {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
    /// Sleep between polls; `None` busy-polls
    pub poll_interval: Option<Duration>,
}

impl RunLimits {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    fn expired(&self, started: Instant) -> bool {
        self.timeout.is_some_and(|t| started.elapsed() >= t)
    }

    fn pause(&self) {
        if let Some(interval) = self.poll_interval {
            thread::sleep(interval);
        }
    }
}

/// Target and max speed for one wheel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelCommand {
    pub target: i64,
    pub max_speed: f32,
}

impl WheelCommand {
    pub fn new(target: i64, max_speed: f32) -> Self {
        Self { target, max_speed }
    }
}

/// One coordinated move, built by a primitive and discarded when it returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionCommand {
    pub left: WheelCommand,
    pub right: WheelCommand,
}

impl MotionCommand {
    pub fn new(left: WheelCommand, right: WheelCommand) -> Self {
        Self { left, right }
    }

    /// Same target and speed on both wheels
    pub fn both(target: i64, max_speed: f32) -> Self {
        let wheel = WheelCommand::new(target, max_speed);
        Self::new(wheel, wheel)
    }
}

/// Owns the left and right actuator handles for the duration of the program
pub struct DualActuator<A: Actuator> {
    left: A,
    right: A,
}

impl<A: Actuator> DualActuator<A> {
    pub fn new(left: A, right: A) -> Self {
        Self { left, right }
    }

    pub fn left(&self) -> &A {
        &self.left
    }

    pub fn right(&self) -> &A {
        &self.right
    }

    pub fn into_inner(self) -> (A, A) {
        (self.left, self.right)
    }

    /// Re-zero both position references
    pub fn zero_positions(&mut self) {
        self.left.set_current_position(0);
        self.right.set_current_position(0);
    }

    /// Load targets and speeds without moving
    pub fn apply(&mut self, cmd: &MotionCommand) {
        debug!(
            "Targets: left={} @ {}, right={} @ {}",
            cmd.left.target, cmd.left.max_speed, cmd.right.target, cmd.right.max_speed
        );
        self.left.set_target(cmd.left.target);
        self.left.set_max_speed(cmd.left.max_speed);
        self.left.set_speed(cmd.left.max_speed);
        self.right.set_target(cmd.right.target);
        self.right.set_max_speed(cmd.right.max_speed);
        self.right.set_speed(cmd.right.max_speed);
    }

    /// Zero, load, run to arrival, zero again
    pub fn execute(&mut self, cmd: &MotionCommand, limits: &RunLimits) -> Result<()> {
        self.zero_positions();
        self.apply(cmd);
        self.run_until_both_arrived(limits)?;
        self.zero_positions();
        Ok(())
    }

    /// Poll both actuators until each reports arrival.
    ///
    /// Each actuator is stopped as soon as it arrives, even if the other one
    /// is still moving. Blocks indefinitely unless `limits` bound it.
    pub fn run_until_both_arrived(&mut self, limits: &RunLimits) -> Result<()> {
        let started = Instant::now();
        let mut left_running = true;
        let mut right_running = true;

        while left_running || right_running {
            if left_running {
                let moving = self.left.advance();
                if !self.or_halt(moving)? {
                    left_running = false;
                    self.left.stop();
                }
            }
            if right_running {
                let moving = self.right.advance();
                if !self.or_halt(moving)? {
                    right_running = false;
                    self.right.stop();
                }
            }
            if !(left_running || right_running) {
                break;
            }

            if limits.cancelled() {
                self.halt();
                return Err(MotionError::Cancelled);
            }
            if limits.expired(started) {
                let (left, right) = (self.left.state(), self.right.state());
                warn!(
                    "Coordinated run timed out after {:?} (left at {}/{}, right at {}/{})",
                    started.elapsed(),
                    left.position,
                    left.target,
                    right.position,
                    right.target
                );
                self.halt();
                return Err(MotionError::ActuatorTimeout {
                    elapsed: started.elapsed(),
                    left_remaining: left.remaining(),
                    right_remaining: right.remaining(),
                });
            }

            limits.pause();
        }

        Ok(())
    }

    /// Set constant speeds for continuous driving
    pub fn set_speeds(&mut self, left: f32, right: f32) {
        self.left.set_max_speed(left.abs());
        self.left.set_speed(left);
        self.right.set_max_speed(right.abs());
        self.right.set_speed(right);
    }

    /// Drive both wheels at their constant speeds until told to stop.
    ///
    /// Returns when the cancel token fires or the timeout (used as a
    /// keep-alive watchdog) lapses. With neither set it never returns.
    pub fn run_continuously(&mut self, limits: &RunLimits) -> Result<()> {
        let started = Instant::now();

        loop {
            if limits.cancelled() || limits.expired(started) {
                self.halt();
                return Ok(());
            }

            let left = self.left.run_speed();
            self.or_halt(left)?;
            let right = self.right.run_speed();
            self.or_halt(right)?;
            limits.pause();
        }
    }

    /// Pass an actuator result through, halting both wheels first if it failed
    fn or_halt<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!("Actuator fault, halting both wheels: {}", e);
            self.halt();
        }
        result
    }

    /// Zero speed and stop both actuators. Idempotent.
    pub fn halt(&mut self) {
        self.left.set_speed(0.0);
        self.right.set_speed(0.0);
        self.left.stop();
        self.right.stop();
    }
}
