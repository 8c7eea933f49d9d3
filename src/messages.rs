// Define message types for the runtime

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::motion::primitives::InvalidDirection;
use crate::motion::{Direction, TeleopCommand};

// Command from teleop/scripts/text link -> runtime
// JSON form is tagged by "cmd", e.g. {"cmd":"spin","direction":0,"angle_deg":90}
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ManeuverCommand {
    Forward { distance_cm: f64 },
    Reverse { distance_cm: f64 },
    Pivot { direction: Direction },
    Spin { direction: Direction, angle_deg: f64 },
    Turn { direction: Direction },
    Stop,
    Circle { diameter_cm: f64, direction: Direction },
    Figure8 { diameter_cm: f64 },
    Angle { angle_deg: f64 },
    Goal { x: f64, y: f64 },
    Square { side_cm: f64 },
    Drive { teleop: TeleopCommand },
    EncoderSweep,
}

impl ManeuverCommand {
    pub fn is_stop(&self) -> bool {
        matches!(self, ManeuverCommand::Stop)
    }

    pub fn teleop(&self) -> Option<TeleopCommand> {
        match self {
            ManeuverCommand::Drive { teleop } => Some(*teleop),
            _ => None,
        }
    }
}

/// How a submitted command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    Cancelled,
    Failed,
    Rejected,
}

/// Published once per submitted command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManeuverOutcome {
    pub command: ManeuverCommand,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Idle,
    Busy,
    Fault,
}

// ---- Text grammar for the serial link ----
//
//   forward <cm>     reverse <cm>      pivot <dir>      spin <dir> <deg>
//   turn <dir>       stop              circle <cm> <dir> figure8 <cm>
//   angle <deg>      goal <x> <y>      square <cm>      sweep
//   drive forward|reverse|spin <dir>|turn <dir>

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseCommandError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command `{0}`")]
    Unknown(String),

    #[error("`{command}` is missing its {arg} argument")]
    MissingArgument {
        command: &'static str,
        arg: &'static str,
    },

    #[error("Invalid {arg} `{value}`")]
    InvalidNumber { arg: &'static str, value: String },

    #[error(transparent)]
    Direction(#[from] InvalidDirection),

    #[error("Unexpected trailing input `{0}`")]
    Trailing(String),
}

struct Args<'a> {
    command: &'static str,
    tokens: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn next(&mut self, arg: &'static str) -> Result<&'a str, ParseCommandError> {
        self.tokens.next().ok_or(ParseCommandError::MissingArgument {
            command: self.command,
            arg,
        })
    }

    fn number(&mut self, arg: &'static str) -> Result<f64, ParseCommandError> {
        let token = self.next(arg)?;
        token.parse().map_err(|_| ParseCommandError::InvalidNumber {
            arg,
            value: token.to_string(),
        })
    }

    fn direction(&mut self) -> Result<Direction, ParseCommandError> {
        let token = self.next("direction")?;
        let raw: u8 = token.parse().map_err(|_| ParseCommandError::InvalidNumber {
            arg: "direction",
            value: token.to_string(),
        })?;
        Ok(Direction::try_from(raw)?)
    }

    fn finish(mut self) -> Result<(), ParseCommandError> {
        match self.tokens.next() {
            Some(extra) => Err(ParseCommandError::Trailing(extra.to_string())),
            None => Ok(()),
        }
    }
}

impl FromStr for ManeuverCommand {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_end_matches(';');
        let mut tokens = s.split_whitespace();
        let head = tokens.next().ok_or(ParseCommandError::Empty)?.to_ascii_lowercase();

        let command: &'static str = match head.as_str() {
            "forward" => "forward",
            "reverse" => "reverse",
            "pivot" => "pivot",
            "spin" => "spin",
            "turn" => "turn",
            "stop" => "stop",
            "circle" => "circle",
            "figure8" => "figure8",
            "angle" => "angle",
            "goal" => "goal",
            "square" => "square",
            "sweep" => "sweep",
            "drive" => "drive",
            _ => return Err(ParseCommandError::Unknown(head)),
        };
        let mut args = Args { command, tokens };

        let cmd = match command {
            "forward" => ManeuverCommand::Forward {
                distance_cm: args.number("distance")?,
            },
            "reverse" => ManeuverCommand::Reverse {
                distance_cm: args.number("distance")?,
            },
            "pivot" => ManeuverCommand::Pivot {
                direction: args.direction()?,
            },
            "spin" => ManeuverCommand::Spin {
                direction: args.direction()?,
                angle_deg: args.number("angle")?,
            },
            "turn" => ManeuverCommand::Turn {
                direction: args.direction()?,
            },
            "stop" => ManeuverCommand::Stop,
            "circle" => ManeuverCommand::Circle {
                diameter_cm: args.number("diameter")?,
                direction: args.direction()?,
            },
            "figure8" => ManeuverCommand::Figure8 {
                diameter_cm: args.number("diameter")?,
            },
            "angle" => ManeuverCommand::Angle {
                angle_deg: args.number("angle")?,
            },
            "goal" => ManeuverCommand::Goal {
                x: args.number("x")?,
                y: args.number("y")?,
            },
            "square" => ManeuverCommand::Square {
                side_cm: args.number("side")?,
            },
            "sweep" => ManeuverCommand::EncoderSweep,
            _ => {
                let motion = args.next("motion")?.to_ascii_lowercase();
                let teleop = match motion.as_str() {
                    "forward" => TeleopCommand::Forward,
                    "reverse" => TeleopCommand::Reverse,
                    "spin" => TeleopCommand::Spin(args.direction()?),
                    "turn" => TeleopCommand::Turn(args.direction()?),
                    _ => return Err(ParseCommandError::Unknown(format!("drive {}", motion))),
                };
                ManeuverCommand::Drive { teleop }
            }
        };

        args.finish()?;
        Ok(cmd)
    }
}

impl fmt::Display for ManeuverCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManeuverCommand::Forward { distance_cm } => write!(f, "forward {}", distance_cm),
            ManeuverCommand::Reverse { distance_cm } => write!(f, "reverse {}", distance_cm),
            ManeuverCommand::Pivot { direction } => write!(f, "pivot {}", u8::from(*direction)),
            ManeuverCommand::Spin {
                direction,
                angle_deg,
            } => write!(f, "spin {} {}", u8::from(*direction), angle_deg),
            ManeuverCommand::Turn { direction } => write!(f, "turn {}", u8::from(*direction)),
            ManeuverCommand::Stop => write!(f, "stop"),
            ManeuverCommand::Circle {
                diameter_cm,
                direction,
            } => write!(f, "circle {} {}", diameter_cm, u8::from(*direction)),
            ManeuverCommand::Figure8 { diameter_cm } => write!(f, "figure8 {}", diameter_cm),
            ManeuverCommand::Angle { angle_deg } => write!(f, "angle {}", angle_deg),
            ManeuverCommand::Goal { x, y } => write!(f, "goal {} {}", x, y),
            ManeuverCommand::Square { side_cm } => write!(f, "square {}", side_cm),
            ManeuverCommand::EncoderSweep => write!(f, "sweep"),
            ManeuverCommand::Drive { teleop } => match teleop {
                TeleopCommand::Forward => write!(f, "drive forward"),
                TeleopCommand::Reverse => write!(f, "drive reverse"),
                TeleopCommand::Spin(dir) => write!(f, "drive spin {}", u8::from(*dir)),
                TeleopCommand::Turn(dir) => write!(f, "drive turn {}", u8::from(*dir)),
            },
        }
    }
}
