// Timeouts, topics, serial link and calibration loading
use std::path::Path;
use std::time::Duration;

use crate::motion::{Calibration, CalibrationParams};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Teleop keep-alive: continuous drive stops if no refresh arrives in time
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Simulated time per actuator poll, and how long the executor sleeps between polls
pub const SIM_STEP_DT: Duration = Duration::from_millis(1);

// Zenoh topics
pub const TOPIC_CMD_MANEUVER: &str = "diffbot/cmd/maneuver"; // commands
pub const TOPIC_DIAGNOSTICS: &str = "diffbot/state/diagnostics"; // encoder/error reports
pub const TOPIC_OUTCOME: &str = "diffbot/state/outcome"; // per-command result
pub const TOPIC_HEALTH: &str = "diffbot/state/health"; // health status

// Text link (HC-05 style serial bridge)
pub const LINK_PORT: &str = "/dev/ttyUSB0";
pub const LINK_BAUDRATE: u32 = 9600;

/// Load calibration from a JSON file. Every field must be present.
pub fn load_calibration(path: &Path) -> Result<Calibration, Box<dyn std::error::Error + Send + Sync>> {
    let text = std::fs::read_to_string(path)?;
    let params: CalibrationParams = serde_json::from_str(&text)?;
    Ok(Calibration::try_from(params)?)
}
