// Differential-drive geometry for the two-wheel stepper base
// Converts robot-frame distances and angles to per-wheel actuator steps.
//
// Rounding policy: every step count is rounded half away from zero, once,
// here. Callers never round again.

use std::f64::consts::PI;

use super::calibration::{Calibration, WheelSpec};
use super::error::{MotionError, Result};

/// Step targets and speed ratio for driving a full circle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleSteps {
    pub inner: i64,
    pub outer: i64,
    /// Inner wheel speed as a fraction of the outer wheel speed
    pub speed_ratio: f32,
}

fn round_steps(steps: f64) -> i64 {
    steps.round() as i64
}

/// Round a requested move, rejecting counts an `i64` target cannot hold
fn checked_steps(what: &str, steps: f64) -> Result<i64> {
    let rounded = steps.round();
    if !rounded.is_finite() || rounded.abs() >= i64::MAX as f64 {
        return Err(MotionError::geometry(format!(
            "{} needs {} steps, more than an actuator target can hold",
            what, steps
        )));
    }
    Ok(rounded as i64)
}

fn require_finite(what: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MotionError::geometry(format!("{} must be finite, got {}", what, value)))
    }
}

/// Steps for a straight-line wheel travel of `distance_cm`
///
/// `steps = (steps_per_rev / circumference) * distance`
pub fn steps_for_linear_distance(wheel: &WheelSpec, distance_cm: f64) -> Result<i64> {
    let distance_cm = require_finite("distance", distance_cm)?;
    if distance_cm < 0.0 {
        return Err(MotionError::geometry(format!(
            "distance must be non-negative, got {} cm",
            distance_cm
        )));
    }
    checked_steps("distance", wheel.steps_per_cm() * distance_cm)
}

/// Steps for the driven wheel to swing the body a quarter turn about the other wheel
///
/// The arc is a quarter of the circle whose radius is the track diameter:
/// `steps = (steps_per_rev / circumference) * (track * PI / 2)`
pub fn steps_for_pivot_arc(wheel: &WheelSpec) -> i64 {
    round_steps(wheel.steps_per_cm() * (wheel.track_diameter_cm() * PI / 2.0))
}

/// Fast and slow wheel steps for the fixed-radius turn: the full pivot arc
/// and half of it
pub fn steps_for_turn(wheel: &WheelSpec) -> (i64, i64) {
    let arc = wheel.steps_per_cm() * (wheel.track_diameter_cm() * PI / 2.0);
    (round_steps(arc), round_steps(arc / 2.0))
}

/// Steps each wheel travels (in opposite senses) to spin the body by `angle_deg`
pub fn steps_for_spin_angle(wheel: &WheelSpec, angle_deg: f64) -> Result<i64> {
    let angle_rad = require_finite("angle", angle_deg)? * (PI / 180.0);
    checked_steps(
        "spin angle",
        wheel.steps_per_cm() * (wheel.track_diameter_cm() * angle_rad / 2.0),
    )
}

/// Encoder ticks a wheel should see while spinning the body by `angle_deg`
pub fn encoder_ticks_expected(cal: &Calibration, angle_deg: f64) -> f64 {
    angle_deg / cal.degrees_per_tick
}

/// Encoder ticks a wheel should see over a straight travel of `distance_cm`
pub fn encoder_ticks_for_distance(cal: &Calibration, distance_cm: f64) -> f64 {
    (cal.ticks_per_rev as f64 / cal.wheel.circumference_cm()) * distance_cm
}

/// Convert an encoder tick error to a (signed) actuator step correction
pub fn ticks_to_steps(cal: &Calibration, ticks: f64) -> i64 {
    round_steps(ticks * cal.steps_per_tick())
}

/// Inner/outer wheel steps for a circle of `diameter_cm` (measured at the body center)
///
/// The inner wheel follows a circle of `diameter - track`, the outer one
/// `diameter + track`. The speed ratio lets both arcs finish together.
pub fn inner_outer_circle_steps(wheel: &WheelSpec, diameter_cm: f64) -> Result<CircleSteps> {
    let diameter_cm = require_finite("circle diameter", diameter_cm)?;
    let track = wheel.track_diameter_cm();
    if diameter_cm <= track {
        return Err(MotionError::geometry(format!(
            "circle diameter {} cm must exceed the track diameter {} cm",
            diameter_cm, track
        )));
    }

    let inner_circ = (diameter_cm - track) * PI;
    let outer_circ = (diameter_cm + track) * PI;
    let inner = checked_steps("circle inner arc", wheel.steps_per_cm() * inner_circ)?;
    let outer = checked_steps("circle outer arc", wheel.steps_per_cm() * outer_circ)?;

    Ok(CircleSteps {
        inner,
        outer,
        speed_ratio: inner as f32 / outer as f32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wheel() -> WheelSpec {
        Calibration::default().wheel
    }

    #[test]
    fn test_zero_distance_is_zero_steps() {
        assert_eq!(steps_for_linear_distance(&wheel(), 0.0).unwrap(), 0);
    }

    #[test]
    fn test_linear_distance_monotonic() {
        let w = wheel();
        let mut last = 0;
        for i in 0..500 {
            let steps = steps_for_linear_distance(&w, i as f64 * 0.37).unwrap();
            assert!(steps >= last, "steps decreased at {}", i);
            last = steps;
        }
    }

    #[test]
    fn test_one_circumference_is_one_revolution() {
        let w = wheel();
        assert_eq!(
            steps_for_linear_distance(&w, w.circumference_cm()).unwrap(),
            800
        );
    }

    #[test]
    fn test_negative_distance_rejected() {
        assert!(matches!(
            steps_for_linear_distance(&wheel(), -1.0),
            Err(MotionError::InvalidGeometry { .. })
        ));
        assert!(steps_for_linear_distance(&wheel(), f64::NAN).is_err());
    }

    #[test]
    fn test_pivot_arc_reference_robot() {
        // (800 / (8.6 * PI)) * (21 * PI / 2) = 976.74
        assert_eq!(steps_for_pivot_arc(&wheel()), 977);
    }

    #[test]
    fn test_turn_is_full_and_half_arc() {
        assert_eq!(steps_for_turn(&wheel()), (977, 488));
    }

    #[test]
    fn test_spin_quarter_turn() {
        // 800 * 21 / (4 * 8.6) = 488.37
        assert_eq!(steps_for_spin_angle(&wheel(), 90.0).unwrap(), 488);
        assert_eq!(steps_for_spin_angle(&wheel(), 0.0).unwrap(), 0);
    }

    #[test]
    fn test_spin_half_turn_equals_pivot_arc() {
        // Half a spin moves each wheel as far as a quarter-turn pivot
        let w = wheel();
        assert_eq!(steps_for_spin_angle(&w, 180.0).unwrap(), steps_for_pivot_arc(&w));
    }

    #[test]
    fn test_expected_ticks_use_calibration_constant() {
        let mut cal = Calibration::default();
        assert!((encoder_ticks_expected(&cal, 3.68) - 1.0).abs() < 1e-9);

        cal.degrees_per_tick = 4.0;
        assert!((encoder_ticks_expected(&cal, 90.0) - 22.5).abs() < 1e-9);
    }

    #[test]
    fn test_ticks_for_distance() {
        let cal = Calibration::default();
        let one_rev = encoder_ticks_for_distance(&cal, cal.wheel.circumference_cm());
        assert!((one_rev - 40.0).abs() < 1e-9);
        assert_eq!(ticks_to_steps(&cal, -0.5), -10);
    }

    #[test]
    fn test_circle_steps() {
        let circle = inner_outer_circle_steps(&wheel(), 60.0).unwrap();
        // (800 / 8.6) * 39 = 3627.9, (800 / 8.6) * 81 = 7534.9
        assert_eq!(circle.inner, 3628);
        assert_eq!(circle.outer, 7535);
        assert!((circle.speed_ratio - 3628.0 / 7535.0).abs() < 1e-6);
    }

    #[test]
    fn test_circle_smaller_than_track_rejected() {
        assert!(matches!(
            inner_outer_circle_steps(&wheel(), 10.0),
            Err(MotionError::InvalidGeometry { .. })
        ));
        assert!(inner_outer_circle_steps(&wheel(), 21.0).is_err());
    }

    #[test]
    fn test_overflowing_step_counts_rejected() {
        let w = wheel();
        assert!(matches!(
            steps_for_linear_distance(&w, 1e300),
            Err(MotionError::InvalidGeometry { .. })
        ));
        assert!(steps_for_spin_angle(&w, 1e306).is_err());
        assert!(steps_for_spin_angle(&w, -1e306).is_err());
        assert!(inner_outer_circle_steps(&w, 1e308).is_err());

        // Large but representable moves still convert
        assert!(steps_for_linear_distance(&w, 1e9).unwrap() > 0);
    }
}
