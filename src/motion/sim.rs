// Simulated constant-speed stepper
//
// Stands in for the hardware driver: every poll advances the position by
// `speed * step_dt` steps and, when wired to an encoder counter, emits one
// tick per `steps_per_tick` steps of travel in either direction.

use std::sync::Arc;
use std::time::Duration;

use super::calibration::Calibration;
use super::coordinator::{Actuator, ActuatorState, DualActuator};
use super::encoder::{EncoderCounter, Encoders, Wheel};
use super::error::{MotionError, Result};

#[derive(Debug)]
pub struct SimulatedStepper {
    wheel: Wheel,
    state: ActuatorState,
    step_dt: f64,
    accumulator: f64,
    encoder: Option<(Arc<EncoderCounter>, u64)>,
    travelled: u64,
    fault: Option<String>,
}

impl SimulatedStepper {
    /// `step_dt` is the simulated time that passes per poll
    pub fn new(wheel: Wheel, step_dt: Duration) -> Self {
        Self {
            wheel,
            state: ActuatorState::default(),
            step_dt: step_dt.as_secs_f64(),
            accumulator: 0.0,
            encoder: None,
            travelled: 0,
            fault: None,
        }
    }

    pub fn with_encoder(mut self, counter: Arc<EncoderCounter>, steps_per_tick: u64) -> Self {
        self.encoder = Some((counter, steps_per_tick.max(1)));
        self
    }

    /// Make every following poll fail, as a disconnected driver would
    pub fn inject_fault(&mut self, reason: impl Into<String>) {
        self.fault = Some(reason.into());
    }

    /// Absolute steps moved since creation
    pub fn travelled(&self) -> u64 {
        self.travelled
    }

    fn check_fault(&self) -> Result<()> {
        match &self.fault {
            Some(reason) => Err(MotionError::Actuator {
                wheel: self.wheel,
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn step(&mut self, dir: i64) {
        self.state.position += dir;
        self.travelled += 1;
        if let Some((counter, steps_per_tick)) = &self.encoder {
            if self.travelled % steps_per_tick == 0 {
                counter.tick();
            }
        }
    }
}

impl Actuator for SimulatedStepper {
    fn set_target(&mut self, steps: i64) {
        self.state.target = steps;
    }

    fn set_max_speed(&mut self, speed: f32) {
        self.state.max_speed = speed.abs();
    }

    fn set_speed(&mut self, speed: f32) {
        self.state.speed = speed;
    }

    fn advance(&mut self) -> Result<bool> {
        self.check_fault()?;
        if self.state.position == self.state.target {
            return Ok(false);
        }

        self.accumulator += self.state.max_speed as f64 * self.step_dt;
        while self.accumulator >= 1.0 && self.state.position != self.state.target {
            let dir = (self.state.target - self.state.position).signum();
            self.step(dir);
            self.accumulator -= 1.0;
        }

        Ok(self.state.position != self.state.target)
    }

    fn run_speed(&mut self) -> Result<()> {
        self.check_fault()?;
        self.accumulator += self.state.speed.abs() as f64 * self.step_dt;
        let dir = self.state.speed.signum() as i64;
        while self.accumulator >= 1.0 {
            self.step(dir);
            self.accumulator -= 1.0;
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.state.target = self.state.position;
        self.accumulator = 0.0;
    }

    fn set_current_position(&mut self, steps: i64) {
        self.state.position = steps;
        self.state.target = steps;
    }

    fn state(&self) -> ActuatorState {
        self.state
    }
}

/// Two simulated wheels wired to `encoders` at the calibrated tick spacing
pub fn simulated_pair(
    cal: &Calibration,
    encoders: &Encoders,
    step_dt: Duration,
) -> DualActuator<SimulatedStepper> {
    let steps_per_tick = cal.steps_per_tick().round() as u64;
    DualActuator::new(
        SimulatedStepper::new(Wheel::Left, step_dt)
            .with_encoder(encoders.counter(Wheel::Left).clone(), steps_per_tick),
        SimulatedStepper::new(Wheel::Right, step_dt)
            .with_encoder(encoders.counter(Wheel::Right).clone(), steps_per_tick),
    )
}
