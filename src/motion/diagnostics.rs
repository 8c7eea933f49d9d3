// One-way diagnostics from the motion core
//
// Reports are purely observational: nothing in the core reads them back.

use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;
use tracing::info;

use super::encoder::TickCounts;
use super::primitives::Direction;

/// Which primitive issued a coordinated run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "direction", rename_all = "snake_case")]
pub enum Primitive {
    Forward,
    Reverse,
    Pivot(Direction),
    Spin(Direction),
    Turn(Direction),
    Circle(Direction),
    EncoderSweep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    Main,
    Correction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "report", rename_all = "snake_case")]
pub enum MotionReport {
    /// A coordinated run completed. Steps are relative to the start of the run.
    Segment {
        primitive: Primitive,
        pass: Pass,
        left_steps: i64,
        right_steps: i64,
    },
    /// Encoder error measured after a main pass
    Correction {
        primitive: Primitive,
        expected_ticks: f64,
        ticks: TickCounts,
        left_error_steps: i64,
        right_error_steps: i64,
    },
    /// One leg of the encoder sweep
    EncoderSample {
        commanded_steps: i64,
        ticks: TickCounts,
        accumulated: TickCounts,
    },
}

/// Receives motion reports.
///
/// This is also the hook for an optional pose estimator: `Segment` reports
/// carry the per-wheel step deltas of every move. The core keeps no pose.
pub trait DiagnosticsSink: Send {
    fn report(&mut self, report: &MotionReport);
}

/// Writes reports to the log
#[derive(Debug, Default)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn report(&mut self, report: &MotionReport) {
        match report {
            MotionReport::Segment {
                primitive,
                pass,
                left_steps,
                right_steps,
            } => info!(
                "{:?} {:?} pass done: left={} right={} steps",
                primitive, pass, left_steps, right_steps
            ),
            MotionReport::Correction {
                primitive,
                expected_ticks,
                ticks,
                left_error_steps,
                right_error_steps,
            } => info!(
                "{:?} encoders: expected {:.2} ticks, left={} right={}, correcting left={} right={} steps",
                primitive,
                expected_ticks,
                ticks.left,
                ticks.right,
                left_error_steps,
                right_error_steps
            ),
            MotionReport::EncoderSample {
                commanded_steps,
                ticks,
                accumulated,
            } => info!(
                "Encoder sweep {} steps: left={} right={} (accumulated left={} right={})",
                commanded_steps, ticks.left, ticks.right, accumulated.left, accumulated.right
            ),
        }
    }
}

/// Forwards reports to another thread; a closed channel drops them
impl DiagnosticsSink for Sender<MotionReport> {
    fn report(&mut self, report: &MotionReport) {
        let _ = self.send(report.clone());
    }
}
