// Error taxonomy for the motion core

use std::time::Duration;

use super::encoder::Wheel;

#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("Invalid geometry: {reason}")]
    InvalidGeometry { reason: String },

    #[error(
        "Actuators did not arrive within {elapsed:?} (left {left_remaining} steps, right {right_remaining} steps remaining)"
    )]
    ActuatorTimeout {
        elapsed: Duration,
        left_remaining: i64,
        right_remaining: i64,
    },

    #[error("Calibration parameter `{field}` is not set")]
    CalibrationUnset { field: &'static str },

    #[error("Coordinated run cancelled by external stop")]
    Cancelled,

    #[error("{wheel:?} actuator fault: {reason}")]
    Actuator { wheel: Wheel, reason: String },

    #[error("Another maneuver is already in flight")]
    Busy,

    #[error("Unsupported: {reason}")]
    Unsupported { reason: String },
}

impl MotionError {
    pub(crate) fn geometry(reason: impl Into<String>) -> Self {
        MotionError::InvalidGeometry {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MotionError>;
