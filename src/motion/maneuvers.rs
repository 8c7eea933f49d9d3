// Compound maneuvers built from the motion primitives
//
// Each maneuver is dead-reckoned on its own; nothing carries a pose from
// one maneuver to the next.

use tracing::info;

use super::coordinator::{Actuator, MotionCommand, WheelCommand};
use super::diagnostics::{Pass, Primitive};
use super::error::{MotionError, Result};
use super::geometry;
use super::primitives::{Direction, MotionController};

/// Turn-then-drive plan for reaching a point in the robot frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalPlan {
    pub heading_deg: f64,
    pub distance_cm: f64,
}

pub fn plan_goal(x: f64, y: f64) -> Result<GoalPlan> {
    if !x.is_finite() || !y.is_finite() {
        return Err(MotionError::geometry(format!(
            "goal ({}, {}) must be finite",
            x, y
        )));
    }
    Ok(GoalPlan {
        heading_deg: y.atan2(x).to_degrees(),
        distance_cm: x.hypot(y),
    })
}

impl<A: Actuator> MotionController<A> {
    /// Drive one full circle of `diameter_cm`, the inner wheel slowed so
    /// both arcs finish together. No correction pass.
    pub fn move_circle(&mut self, diameter_cm: f64, direction: Direction) -> Result<()> {
        let circle = geometry::inner_outer_circle_steps(&self.calibration().wheel, diameter_cm)?;
        let outer_speed = self.calibration().speeds.circle_outer;
        let inner = WheelCommand::new(circle.inner, outer_speed * circle.speed_ratio);
        let outer = WheelCommand::new(circle.outer, outer_speed);

        let cmd = match direction {
            Direction::Zero => MotionCommand::new(outer, inner),
            Direction::One => MotionCommand::new(inner, outer),
        };
        self.run(Primitive::Circle(direction), Pass::Main, cmd)
    }

    /// Two back-to-back circles, direction 0 then 1
    pub fn move_figure8(&mut self, diameter_cm: f64) -> Result<()> {
        geometry::inner_outer_circle_steps(&self.calibration().wheel, diameter_cm)?;

        self.move_circle(diameter_cm, Direction::Zero)?;
        self.move_circle(diameter_cm, Direction::One)
    }

    /// Spin by `angle_deg`: positive spins with direction 0, anything else
    /// with direction 1. The sign alone picks the way; angles are not
    /// normalized.
    pub fn go_to_angle(&mut self, angle_deg: f64) -> Result<()> {
        self.zero_positions();
        if angle_deg > 0.0 {
            self.spin(Direction::Zero, angle_deg)
        } else {
            self.spin(Direction::One, angle_deg.abs())
        }
    }

    /// Face the point (x, y) then drive straight to it
    pub fn go_to_goal(&mut self, x: f64, y: f64) -> Result<()> {
        let plan = plan_goal(x, y)?;
        info!(
            "Goal ({}, {}): heading {:.2} deg, distance {:.2} cm",
            x, y, plan.heading_deg, plan.distance_cm
        );

        geometry::steps_for_linear_distance(&self.calibration().wheel, plan.distance_cm)?;

        self.go_to_angle(plan.heading_deg)?;
        self.forward(plan.distance_cm)
    }

    /// Four sides of `side_cm`, each followed by a 90 degree spin
    pub fn make_square(&mut self, side_cm: f64) -> Result<()> {
        geometry::steps_for_linear_distance(&self.calibration().wheel, side_cm)?;

        for _ in 0..4 {
            self.forward(side_cm)?;
            self.spin(Direction::Zero, 90.0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::calibration::Calibration;
    use crate::motion::primitives::testing::*;

    #[test]
    fn test_circle_directions_mirror() {
        let (mut ctl, rx) = sim_controller(Calibration::default());

        ctl.move_circle(60.0, Direction::Zero).unwrap();
        let zero_speeds = (
            ctl.drive().left().state().max_speed,
            ctl.drive().right().state().max_speed,
        );
        ctl.move_circle(60.0, Direction::One).unwrap();
        let one_speeds = (
            ctl.drive().left().state().max_speed,
            ctl.drive().right().state().max_speed,
        );

        assert_eq!(
            segments(&rx),
            vec![
                (Primitive::Circle(Direction::Zero), Pass::Main, 7535, 3628),
                (Primitive::Circle(Direction::One), Pass::Main, 3628, 7535),
            ]
        );
        assert_eq!(zero_speeds.0, 500.0);
        assert_eq!(zero_speeds, (one_speeds.1, one_speeds.0));
        assert!((zero_speeds.1 - 500.0 * 3628.0 / 7535.0).abs() < 1e-3);
    }

    #[test]
    fn test_circle_inside_track_rejected() {
        let (mut ctl, rx) = sim_controller(Calibration::default());
        assert!(matches!(
            ctl.move_circle(15.0, Direction::Zero),
            Err(MotionError::InvalidGeometry { .. })
        ));
        assert!(ctl.move_figure8(21.0).is_err());
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_figure8_is_two_circles_in_order() {
        let (mut ctl, rx) = sim_controller(Calibration::default());
        ctl.move_figure8(50.0).unwrap();

        let circle = geometry::inner_outer_circle_steps(&ctl.calibration().wheel, 50.0).unwrap();
        assert_eq!(
            segments(&rx),
            vec![
                (
                    Primitive::Circle(Direction::Zero),
                    Pass::Main,
                    circle.outer,
                    circle.inner
                ),
                (
                    Primitive::Circle(Direction::One),
                    Pass::Main,
                    circle.inner,
                    circle.outer
                ),
            ]
        );
    }

    #[test]
    fn test_negative_angle_uses_opposite_spin() {
        let (mut neg, neg_rx) = sim_controller(Calibration::default());
        neg.go_to_angle(-45.0).unwrap();

        let (mut spin, spin_rx) = sim_controller(Calibration::default());
        spin.spin(Direction::One, 45.0).unwrap();

        let (mut pos, pos_rx) = sim_controller(Calibration::default());
        pos.go_to_angle(45.0).unwrap();

        let neg_segments = segments(&neg_rx);
        assert_eq!(neg_segments, segments(&spin_rx));
        for (n, p) in neg_segments.iter().zip(segments(&pos_rx)) {
            assert_eq!(n.0, Primitive::Spin(Direction::One));
            assert_eq!(p.0, Primitive::Spin(Direction::Zero));
            assert_eq!((n.2, n.3), (-p.2, -p.3));
        }
    }

    #[test]
    fn test_goal_plan() {
        let plan = plan_goal(3.0, 4.0).unwrap();
        assert!((plan.heading_deg - 53.1301).abs() < 1e-3);
        assert!((plan.distance_cm - 5.0).abs() < 1e-12);

        assert!(plan_goal(f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn test_go_to_goal_turns_then_drives() {
        let (mut ctl, rx) = sim_controller(Calibration::default());
        ctl.go_to_goal(3.0, 4.0).unwrap();

        let wheel = ctl.calibration().wheel;
        let spin_steps = geometry::steps_for_spin_angle(&wheel, 4f64.atan2(3.0).to_degrees()).unwrap();
        let drive_steps = geometry::steps_for_linear_distance(&wheel, 5.0).unwrap();

        let segs = segments(&rx);
        assert_eq!(segs.len(), 4);
        assert_eq!(
            segs[0],
            (Primitive::Spin(Direction::Zero), Pass::Main, spin_steps, -spin_steps)
        );
        assert_eq!(segs[1].0, Primitive::Spin(Direction::Zero));
        assert_eq!(segs[2], (Primitive::Forward, Pass::Main, drive_steps, drive_steps));
        assert_eq!(segs[3].1, Pass::Correction);
    }

    #[test]
    fn test_unreachable_goal_fails_before_turning() {
        let (mut ctl, rx) = sim_controller(Calibration::default());
        assert!(matches!(
            ctl.go_to_goal(1e308, 1e308),
            Err(MotionError::InvalidGeometry { .. })
        ));
        assert_eq!(rx.try_iter().count(), 0);
        assert_eq!(ctl.drive().left().travelled(), 0);
    }

    #[test]
    fn test_square_is_four_sides_and_spins() {
        let (mut ctl, rx) = sim_controller(Calibration::default());
        ctl.make_square(20.0).unwrap();

        let primitives: Vec<_> = segments(&rx)
            .into_iter()
            .filter(|s| s.1 == Pass::Main)
            .map(|s| s.0)
            .collect();
        let side = [Primitive::Forward, Primitive::Spin(Direction::Zero)];
        assert_eq!(primitives, side.repeat(4));
    }

    #[test]
    fn test_square_rejects_negative_side_before_motion() {
        let (mut ctl, rx) = sim_controller(Calibration::default());
        assert!(ctl.make_square(-1.0).is_err());
        assert_eq!(rx.try_iter().count(), 0);
    }
}
