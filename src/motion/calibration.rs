// Calibration parameters for the two-wheel stepper base
//
// Everything the geometry layer needs lives here so it can be swapped
// from a JSON file without touching maneuver logic.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::error::{MotionError, Result};

/// Wheel diameter of the reference robot (cm)
pub const DEFAULT_WHEEL_DIAMETER_CM: f64 = 8.6;
/// Center-to-center distance between the two wheels (cm)
pub const DEFAULT_TRACK_DIAMETER_CM: f64 = 21.0;
/// Stepper driver runs in 1/4 microstepping: 800 steps per wheel revolution
pub const DEFAULT_STEPS_PER_REV: u32 = 800;
/// Encoder slots counted per wheel revolution
pub const DEFAULT_TICKS_PER_REV: u32 = 40;
/// Degrees of body rotation per encoder tick during a spin (empirical)
pub const DEFAULT_DEGREES_PER_TICK: f64 = 3.68;

/// Physical wheel layout. Never mutated once built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelSpec {
    diameter_cm: f64,
    circumference_cm: f64,
    track_diameter_cm: f64,
    steps_per_rev: u32,
}

impl WheelSpec {
    pub fn new(diameter_cm: f64, track_diameter_cm: f64, steps_per_rev: u32) -> Result<Self> {
        let diameter_cm = require_positive("wheel_diameter_cm", diameter_cm)?;
        let track_diameter_cm = require_positive("track_diameter_cm", track_diameter_cm)?;
        if steps_per_rev == 0 {
            return Err(MotionError::CalibrationUnset {
                field: "steps_per_rev",
            });
        }

        Ok(Self {
            diameter_cm,
            circumference_cm: diameter_cm * PI,
            track_diameter_cm,
            steps_per_rev,
        })
    }

    pub fn diameter_cm(&self) -> f64 {
        self.diameter_cm
    }

    pub fn circumference_cm(&self) -> f64 {
        self.circumference_cm
    }

    pub fn track_diameter_cm(&self) -> f64 {
        self.track_diameter_cm
    }

    pub fn steps_per_rev(&self) -> u32 {
        self.steps_per_rev
    }

    /// Actuator steps per centimeter of wheel travel
    pub fn steps_per_cm(&self) -> f64 {
        self.steps_per_rev as f64 / self.circumference_cm
    }
}

/// Max speeds (steps/s) for each primitive class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedProfile {
    pub straight: f32,
    pub reverse: f32,
    pub pivot: f32,
    pub spin: f32,
    pub turn_fast: f32,
    pub turn_slow: f32,
    pub circle_outer: f32,
    pub teleop: f32,
}

impl Default for SpeedProfile {
    fn default() -> Self {
        Self {
            straight: 300.0,
            reverse: 500.0,
            pivot: 300.0,
            spin: 300.0,
            turn_fast: 300.0,
            turn_slow: 150.0,
            circle_outer: 500.0,
            teleop: 300.0,
        }
    }
}

/// Full calibration set consumed by the motion core
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub wheel: WheelSpec,
    pub ticks_per_rev: u32,
    pub degrees_per_tick: f64,
    pub speeds: SpeedProfile,
}

impl Calibration {
    /// Actuator steps covered by one encoder tick
    pub fn steps_per_tick(&self) -> f64 {
        self.wheel.steps_per_rev() as f64 / self.ticks_per_rev as f64
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            wheel: WheelSpec {
                diameter_cm: DEFAULT_WHEEL_DIAMETER_CM,
                circumference_cm: DEFAULT_WHEEL_DIAMETER_CM * PI,
                track_diameter_cm: DEFAULT_TRACK_DIAMETER_CM,
                steps_per_rev: DEFAULT_STEPS_PER_REV,
            },
            ticks_per_rev: DEFAULT_TICKS_PER_REV,
            degrees_per_tick: DEFAULT_DEGREES_PER_TICK,
            speeds: SpeedProfile::default(),
        }
    }
}

/// Calibration as read from a file. Any field left out is reported as unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationParams {
    pub wheel_diameter_cm: Option<f64>,
    pub track_diameter_cm: Option<f64>,
    pub steps_per_rev: Option<u32>,
    pub ticks_per_rev: Option<u32>,
    pub degrees_per_tick: Option<f64>,
    pub speeds: Option<SpeedProfile>,
}

impl TryFrom<CalibrationParams> for Calibration {
    type Error = MotionError;

    fn try_from(params: CalibrationParams) -> Result<Self> {
        let wheel = WheelSpec::new(
            params.wheel_diameter_cm.ok_or(unset("wheel_diameter_cm"))?,
            params.track_diameter_cm.ok_or(unset("track_diameter_cm"))?,
            params.steps_per_rev.ok_or(unset("steps_per_rev"))?,
        )?;

        let ticks_per_rev = params.ticks_per_rev.ok_or(unset("ticks_per_rev"))?;
        if ticks_per_rev == 0 {
            return Err(unset("ticks_per_rev"));
        }

        let degrees_per_tick = require_positive(
            "degrees_per_tick",
            params.degrees_per_tick.ok_or(unset("degrees_per_tick"))?,
        )?;

        Ok(Self {
            wheel,
            ticks_per_rev,
            degrees_per_tick,
            speeds: params.speeds.ok_or(unset("speeds"))?,
        })
    }
}

impl From<&Calibration> for CalibrationParams {
    fn from(cal: &Calibration) -> Self {
        Self {
            wheel_diameter_cm: Some(cal.wheel.diameter_cm()),
            track_diameter_cm: Some(cal.wheel.track_diameter_cm()),
            steps_per_rev: Some(cal.wheel.steps_per_rev()),
            ticks_per_rev: Some(cal.ticks_per_rev),
            degrees_per_tick: Some(cal.degrees_per_tick),
            speeds: Some(cal.speeds),
        }
    }
}

fn unset(field: &'static str) -> MotionError {
    MotionError::CalibrationUnset { field }
}

/// Zero or NaN counts as "not provided"; a negative value is a bad measurement
fn require_positive(field: &'static str, value: f64) -> Result<f64> {
    if value == 0.0 || !value.is_finite() {
        Err(unset(field))
    } else if value < 0.0 {
        Err(MotionError::geometry(format!("{} must be positive, got {}", field, value)))
    } else {
        Ok(value)
    }
}
