// Motion primitives: forward, reverse, pivot, spin, turn, stop
//
// Each primitive is one coordinated move built from the geometry layer.
// Forward, reverse and spin follow it with a single encoder correction pass;
// pivot and turn do not.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::calibration::Calibration;
use super::coordinator::{Actuator, DualActuator, MotionCommand, RunLimits, WheelCommand};
use super::diagnostics::{DiagnosticsSink, MotionReport, Pass, Primitive};
use super::encoder::Encoders;
use super::error::{MotionError, Result};
use super::geometry;

/// Encoder sweep legs, in steps
pub const ENCODER_SWEEP_STEPS: [i64; 4] = [200, 400, 800, 1600];

/// Direction selector, encoded as 0 or 1 on the wire.
///
/// Its physical meaning depends on the primitive:
/// - pivot: `Zero` drives the right wheel, `One` the left
/// - spin: `Zero` drives the left wheel forward and the right back, `One` the reverse
/// - turn: `Zero` puts the right wheel on the outside, `One` the left
/// - circle: `Zero` puts the right wheel on the inside, `One` the left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Direction {
    Zero,
    One,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Zero => Direction::One,
            Direction::One => Direction::Zero,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("direction must be 0 or 1, got {0}")]
pub struct InvalidDirection(pub u8);

impl TryFrom<u8> for Direction {
    type Error = InvalidDirection;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::Zero),
            1 => Ok(Direction::One),
            other => Err(InvalidDirection(other)),
        }
    }
}

impl From<Direction> for u8 {
    fn from(dir: Direction) -> Self {
        match dir {
            Direction::Zero => 0,
            Direction::One => 1,
        }
    }
}

/// Continuous (teleoperation) motions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "motion", content = "direction", rename_all = "snake_case")]
pub enum TeleopCommand {
    Forward,
    Reverse,
    Spin(Direction),
    Turn(Direction),
}

/// The control layer: owns both actuators and the encoder handles.
///
/// Every method takes `&mut self`, so only one primitive or maneuver can
/// be in flight at a time.
pub struct MotionController<A: Actuator> {
    cal: Calibration,
    drive: DualActuator<A>,
    encoders: Encoders,
    limits: RunLimits,
    sink: Option<Box<dyn DiagnosticsSink>>,
}

impl<A: Actuator> MotionController<A> {
    pub fn new(cal: Calibration, drive: DualActuator<A>, encoders: Encoders) -> Self {
        Self {
            cal,
            drive,
            encoders,
            limits: RunLimits::default(),
            sink: None,
        }
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_sink(mut self, sink: impl DiagnosticsSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn set_limits(&mut self, limits: RunLimits) {
        self.limits = limits;
    }

    pub fn limits(&self) -> &RunLimits {
        &self.limits
    }

    pub fn calibration(&self) -> &Calibration {
        &self.cal
    }

    pub fn drive(&self) -> &DualActuator<A> {
        &self.drive
    }

    pub fn encoders(&self) -> &Encoders {
        &self.encoders
    }

    pub(crate) fn zero_positions(&mut self) {
        self.drive.zero_positions();
    }

    pub(crate) fn emit(&mut self, report: MotionReport) {
        if let Some(sink) = self.sink.as_mut() {
            sink.report(&report);
        }
    }

    /// One coordinated run, reported as a segment
    pub(crate) fn run(&mut self, primitive: Primitive, pass: Pass, cmd: MotionCommand) -> Result<()> {
        debug!("{:?} {:?} pass", primitive, pass);
        self.drive.execute(&cmd, &self.limits)?;
        self.emit(MotionReport::Segment {
            primitive,
            pass,
            left_steps: cmd.left.target,
            right_steps: cmd.right.target,
        });
        Ok(())
    }

    /// Measure encoder error once and issue one corrective move.
    ///
    /// `signs` maps a positive error (wheel fell short) to the step
    /// direction each wheel travelled in the main pass.
    fn correct(
        &mut self,
        primitive: Primitive,
        expected_ticks: f64,
        signs: (i64, i64),
        max_speed: f32,
    ) -> Result<()> {
        let ticks = self.encoders.take();
        let left_error = geometry::ticks_to_steps(&self.cal, expected_ticks - ticks.left as f64);
        let right_error = geometry::ticks_to_steps(&self.cal, expected_ticks - ticks.right as f64);

        info!(
            "{:?}: expected {:.2} ticks, measured left={} right={}",
            primitive, expected_ticks, ticks.left, ticks.right
        );
        self.emit(MotionReport::Correction {
            primitive,
            expected_ticks,
            ticks,
            left_error_steps: left_error,
            right_error_steps: right_error,
        });

        let cmd = MotionCommand::new(
            WheelCommand::new(signs.0 * left_error, max_speed),
            WheelCommand::new(signs.1 * right_error, max_speed),
        );
        self.run(primitive, Pass::Correction, cmd)
    }

    /// Drive both wheels forward `distance_cm`, then correct from the encoders
    pub fn forward(&mut self, distance_cm: f64) -> Result<()> {
        self.straight(Primitive::Forward, distance_cm, 1, self.cal.speeds.straight)
    }

    /// Drive both wheels back `distance_cm`, then correct from the encoders
    pub fn reverse(&mut self, distance_cm: f64) -> Result<()> {
        self.straight(Primitive::Reverse, distance_cm, -1, self.cal.speeds.reverse)
    }

    fn straight(&mut self, primitive: Primitive, distance_cm: f64, sign: i64, speed: f32) -> Result<()> {
        let steps = geometry::steps_for_linear_distance(&self.cal.wheel, distance_cm)?;
        let expected_ticks = geometry::encoder_ticks_for_distance(&self.cal, distance_cm);

        self.encoders.reset_both();
        self.run(primitive, Pass::Main, MotionCommand::both(sign * steps, speed))?;
        self.correct(primitive, expected_ticks, (sign, sign), speed)
    }

    /// Quarter turn about the stationary wheel. No correction pass.
    pub fn pivot(&mut self, direction: Direction) -> Result<()> {
        let arc = geometry::steps_for_pivot_arc(&self.cal.wheel);
        let speed = self.cal.speeds.pivot;
        let (left, right) = match direction {
            Direction::Zero => (0, arc),
            Direction::One => (arc, 0),
        };

        self.run(
            Primitive::Pivot(direction),
            Pass::Main,
            MotionCommand::new(WheelCommand::new(left, speed), WheelCommand::new(right, speed)),
        )
    }

    /// Spin in place by `angle_deg` (non-negative), then correct from the encoders
    pub fn spin(&mut self, direction: Direction, angle_deg: f64) -> Result<()> {
        if !angle_deg.is_finite() || angle_deg < 0.0 {
            return Err(MotionError::geometry(format!(
                "spin angle must be a non-negative number of degrees, got {}",
                angle_deg
            )));
        }

        let steps = geometry::steps_for_spin_angle(&self.cal.wheel, angle_deg)?;
        let expected_ticks = geometry::encoder_ticks_expected(&self.cal, angle_deg);
        let speed = self.cal.speeds.spin;
        let signs = match direction {
            Direction::Zero => (1, -1),
            Direction::One => (-1, 1),
        };
        let primitive = Primitive::Spin(direction);

        self.zero_positions();
        self.encoders.reset_both();
        self.run(
            primitive,
            Pass::Main,
            MotionCommand::new(
                WheelCommand::new(signs.0 * steps, speed),
                WheelCommand::new(signs.1 * steps, speed),
            ),
        )?;
        self.correct(primitive, expected_ticks, signs, speed)
    }

    /// Fixed-radius turn: the outer wheel covers the pivot arc, the inner
    /// one half of it at half speed. No correction pass.
    pub fn turn(&mut self, direction: Direction) -> Result<()> {
        let (full, half) = geometry::steps_for_turn(&self.cal.wheel);
        let fast = WheelCommand::new(full, self.cal.speeds.turn_fast);
        let slow = WheelCommand::new(half, self.cal.speeds.turn_slow);
        let cmd = match direction {
            Direction::Zero => MotionCommand::new(slow, fast),
            Direction::One => MotionCommand::new(fast, slow),
        };

        self.run(Primitive::Turn(direction), Pass::Main, cmd)
    }

    /// Zero both speeds and stop. Always safe, idempotent.
    pub fn stop(&mut self) {
        info!("Stopping both wheels");
        self.drive.halt();
    }

    /// Drive continuously until the run limits' cancel token fires or the
    /// timeout (keep-alive watchdog) lapses
    pub fn teleop(&mut self, motion: TeleopCommand) -> Result<()> {
        let v = self.cal.speeds.teleop;
        let (left, right) = match motion {
            TeleopCommand::Forward => (v, v),
            TeleopCommand::Reverse => (-v, -v),
            TeleopCommand::Spin(Direction::Zero) => (v, -v),
            TeleopCommand::Spin(Direction::One) => (-v, v),
            TeleopCommand::Turn(Direction::Zero) => (v / 2.0, v),
            TeleopCommand::Turn(Direction::One) => (v, v / 2.0),
        };

        info!("Teleop {:?}: left={} right={} steps/s", motion, left, right);
        self.zero_positions();
        self.drive.set_speeds(left, right);
        self.drive.run_continuously(&self.limits)
    }

    /// Drive both wheels through each sweep leg and report the ticks seen
    pub fn encoder_sweep(&mut self) -> Result<()> {
        let speed = self.cal.speeds.straight;
        for steps in ENCODER_SWEEP_STEPS {
            self.encoders.reset_both();
            self.run(Primitive::EncoderSweep, Pass::Main, MotionCommand::both(steps, speed))?;
            let report = MotionReport::EncoderSample {
                commanded_steps: steps,
                ticks: self.encoders.take(),
                accumulated: self.encoders.accumulated(),
            };
            self.emit(report);
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::testing::*;
    use super::*;
    use crate::motion::encoder::Wheel;
    use crate::motion::sim::simulated_pair;

    #[test]
    fn test_direction_wire_encoding() {
        assert_eq!(Direction::try_from(0), Ok(Direction::Zero));
        assert_eq!(Direction::try_from(1), Ok(Direction::One));
        assert_eq!(Direction::try_from(2), Err(InvalidDirection(2)));
        assert_eq!(u8::from(Direction::One), 1);
        assert_eq!(Direction::Zero.opposite(), Direction::One);
    }

    #[test]
    fn test_forward_zero_is_noop() {
        let (mut ctl, rx) = sim_controller(Calibration::default());
        ctl.forward(0.0).unwrap();

        assert_eq!(
            segments(&rx),
            vec![
                (Primitive::Forward, Pass::Main, 0, 0),
                (Primitive::Forward, Pass::Correction, 0, 0),
            ]
        );
    }

    #[test]
    fn test_forward_corrects_from_encoders() {
        let (mut ctl, rx) = sim_controller(Calibration::default());
        ctl.forward(30.0).unwrap();

        // 888 steps yield 44 ticks; 44.42 were expected, 0.42 ticks = 8 steps short
        let reports: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            reports[1],
            MotionReport::Correction {
                primitive: Primitive::Forward,
                expected_ticks: geometry::encoder_ticks_for_distance(ctl.calibration(), 30.0),
                ticks: crate::motion::encoder::TickCounts { left: 44, right: 44 },
                left_error_steps: 8,
                right_error_steps: 8,
            }
        );
        assert_eq!(
            reports[2],
            MotionReport::Segment {
                primitive: Primitive::Forward,
                pass: Pass::Correction,
                left_steps: 8,
                right_steps: 8,
            }
        );
    }

    #[test]
    fn test_reverse_mirrors_forward() {
        let (mut ctl, rx) = sim_controller(Calibration::default());
        ctl.reverse(30.0).unwrap();

        assert_eq!(
            segments(&rx),
            vec![
                (Primitive::Reverse, Pass::Main, -888, -888),
                (Primitive::Reverse, Pass::Correction, -8, -8),
            ]
        );
        assert_eq!(ctl.drive().left().state().max_speed, 500.0);
    }

    #[test]
    fn test_negative_distance_fails_before_motion() {
        let (mut ctl, rx) = sim_controller(Calibration::default());
        assert!(matches!(
            ctl.forward(-5.0),
            Err(MotionError::InvalidGeometry { .. })
        ));
        assert_eq!(rx.try_iter().count(), 0);
        assert_eq!(ctl.drive().left().travelled(), 0);
    }

    #[test]
    fn test_pivot_reference_robot() {
        let (mut ctl, rx) = sim_controller(Calibration::default());
        ctl.pivot(Direction::Zero).unwrap();
        ctl.pivot(Direction::One).unwrap();

        // Single pass each: pivot has no correction, unlike forward and spin
        assert_eq!(
            segments(&rx),
            vec![
                (Primitive::Pivot(Direction::Zero), Pass::Main, 0, 977),
                (Primitive::Pivot(Direction::One), Pass::Main, 977, 0),
            ]
        );
    }

    #[test]
    fn test_spin_directions_are_negations() {
        let (mut ctl_zero, rx_zero) = sim_controller(Calibration::default());
        ctl_zero.spin(Direction::Zero, 90.0).unwrap();
        let zero = segments(&rx_zero);

        let (mut ctl_one, rx_one) = sim_controller(Calibration::default());
        ctl_one.spin(Direction::One, 90.0).unwrap();
        let one = segments(&rx_one);

        assert_eq!(
            zero,
            vec![
                (Primitive::Spin(Direction::Zero), Pass::Main, 488, -488),
                (Primitive::Spin(Direction::Zero), Pass::Correction, 9, -9),
            ]
        );
        assert_eq!(zero.len(), one.len());
        for (z, o) in zero.iter().zip(&one) {
            assert_eq!((z.2, z.3), (-o.2, -o.3));
        }
    }

    #[test]
    fn test_spin_rejects_negative_angle() {
        let (mut ctl, _rx) = sim_controller(Calibration::default());
        assert!(ctl.spin(Direction::Zero, -10.0).is_err());
        assert!(ctl.spin(Direction::Zero, f64::NAN).is_err());
    }

    #[test]
    fn test_turn_slow_wheel_at_half_speed() {
        let (mut ctl, rx) = sim_controller(Calibration::default());
        ctl.turn(Direction::Zero).unwrap();

        assert_eq!(
            segments(&rx),
            vec![(Primitive::Turn(Direction::Zero), Pass::Main, 488, 977)]
        );
        assert_eq!(ctl.drive().left().state().max_speed, 150.0);
        assert_eq!(ctl.drive().right().state().max_speed, 300.0);
    }

    #[test]
    fn test_oversized_moves_fail_before_motion() {
        let (mut ctl, rx) = sim_controller(Calibration::default());
        assert!(matches!(
            ctl.forward(1e300),
            Err(MotionError::InvalidGeometry { .. })
        ));
        assert!(ctl.spin(Direction::Zero, 1e306).is_err());
        assert_eq!(rx.try_iter().count(), 0);
        assert_eq!(ctl.drive().left().travelled(), 0);
    }

    #[test]
    fn test_actuator_fault_reaches_caller_uncorrected() {
        let cal = Calibration::default();
        let encoders = Encoders::new();
        let (left, mut right) = simulated_pair(&cal, &encoders, SIM_DT).into_inner();
        right.inject_fault("driver not responding");
        let (tx, rx) = std::sync::mpsc::channel();
        let mut ctl =
            MotionController::new(cal, DualActuator::new(left, right), encoders).with_sink(tx);

        match ctl.forward(10.0) {
            Err(MotionError::Actuator { wheel, .. }) => assert_eq!(wheel, Wheel::Right),
            other => panic!("expected actuator fault, got {:?}", other),
        }

        let reports: Vec<_> = rx.try_iter().collect();
        assert!(!reports.iter().any(|r| matches!(
            r,
            MotionReport::Correction { .. }
                | MotionReport::Segment {
                    pass: Pass::Correction,
                    ..
                }
        )));
        assert_eq!(ctl.drive().left().state().speed, 0.0);
        assert_eq!(ctl.drive().left().state().remaining(), 0);
    }

    #[test]
    fn test_stop_twice() {
        let (mut ctl, _rx) = sim_controller(Calibration::default());
        ctl.stop();
        ctl.stop();
        assert_eq!(ctl.drive().left().state().speed, 0.0);
        assert_eq!(ctl.drive().right().state().speed, 0.0);
    }

    #[test]
    fn test_stalled_run_surfaces_timeout() {
        let mut cal = Calibration::default();
        cal.speeds.straight = 0.0;
        let (ctl, _rx) = blind_controller(cal);
        let mut ctl = ctl.with_limits(
            RunLimits::default()
                .with_timeout(Duration::from_millis(20))
                .with_poll_interval(Duration::from_millis(1)),
        );

        assert!(matches!(
            ctl.forward(10.0),
            Err(MotionError::ActuatorTimeout { .. })
        ));
    }

    #[test]
    fn test_teleop_runs_until_watchdog() {
        let mut cal = Calibration::default();
        cal.speeds.teleop = 5000.0;
        let (ctl, _rx) = sim_controller(cal);
        let mut ctl = ctl.with_limits(
            RunLimits::default()
                .with_timeout(Duration::from_millis(20))
                .with_poll_interval(Duration::from_millis(1)),
        );

        ctl.teleop(TeleopCommand::Spin(Direction::Zero)).unwrap();

        assert!(ctl.drive().left().state().position > 0);
        assert!(ctl.drive().right().state().position < 0);
        assert_eq!(ctl.drive().left().state().speed, 0.0);
    }

    #[test]
    fn test_encoder_sweep_reports_each_leg() {
        let (mut ctl, rx) = sim_controller(Calibration::default());
        ctl.encoder_sweep().unwrap();

        let samples: Vec<_> = rx
            .try_iter()
            .filter_map(|r| match r {
                MotionReport::EncoderSample {
                    commanded_steps,
                    ticks,
                    ..
                } => Some((commanded_steps, ticks.left, ticks.right)),
                _ => None,
            })
            .collect();
        assert_eq!(
            samples,
            vec![(200, 10, 10), (400, 20, 20), (800, 40, 40), (1600, 80, 80)]
        );
    }
}
