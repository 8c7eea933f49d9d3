// Motion core for the two-wheel stepper base
//
// Provides:
// - Wheel geometry (distances and angles -> actuator steps)
// - Dual-actuator coordination (run both wheels until both arrive)
// - Encoder tick counters and the one-shot correction pass
// - Motion primitives and compound maneuvers

pub mod calibration;
pub mod coordinator;
pub mod diagnostics;
mod error;
pub mod encoder;
pub mod geometry;
mod maneuvers;
pub mod primitives;
pub mod sim;

pub use calibration::{Calibration, CalibrationParams, SpeedProfile, WheelSpec};
pub use coordinator::{Actuator, ActuatorState, CancelToken, DualActuator, MotionCommand, RunLimits};
pub use diagnostics::{DiagnosticsSink, LogSink, MotionReport};
pub use encoder::{Encoders, Wheel};
pub use error::{MotionError, Result};
pub use maneuvers::{GoalPlan, plan_goal};
pub use primitives::{Direction, MotionController, TeleopCommand};
