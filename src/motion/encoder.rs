// Wheel encoder tick counters
//
// Ticks arrive asynchronously (interrupt handler, simulator, sampling thread)
// while the control sequence reads and resets. Counters are plain atomics:
// a tick landing during a read may be counted in this maneuver or the next,
// and an off-by-one is accepted.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wheel {
    Left,
    Right,
}

/// Monotonic tick counter for one wheel
#[derive(Debug, Default)]
pub struct EncoderCounter {
    count: AtomicU64,
    // Lifetime total, never reset
    accumulated: AtomicU64,
}

impl EncoderCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the tick source on every encoder edge
    pub fn tick(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.accumulated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
    }

    pub fn read_and_reset(&self) -> u64 {
        self.count.swap(0, Ordering::Relaxed)
    }

    pub fn accumulated(&self) -> u64 {
        self.accumulated.load(Ordering::Relaxed)
    }
}

/// Tick counts for both wheels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickCounts {
    pub left: u64,
    pub right: u64,
}

/// Shared handles to the left and right counters.
///
/// Cloning shares the counters: hand one clone to the tick source and keep
/// one in the control layer.
#[derive(Debug, Clone, Default)]
pub struct Encoders {
    left: Arc<EncoderCounter>,
    right: Arc<EncoderCounter>,
}

impl Encoders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, wheel: Wheel) -> &Arc<EncoderCounter> {
        match wheel {
            Wheel::Left => &self.left,
            Wheel::Right => &self.right,
        }
    }

    pub fn on_tick(&self, wheel: Wheel) {
        self.counter(wheel).tick();
    }

    pub fn read(&self, wheel: Wheel) -> u64 {
        self.counter(wheel).read()
    }

    pub fn reset(&self, wheel: Wheel) {
        self.counter(wheel).reset();
    }

    pub fn read_and_reset(&self, wheel: Wheel) -> u64 {
        self.counter(wheel).read_and_reset()
    }

    pub fn reset_both(&self) {
        self.left.reset();
        self.right.reset();
    }

    /// Read and clear both counters (left first)
    pub fn take(&self) -> TickCounts {
        TickCounts {
            left: self.left.read_and_reset(),
            right: self.right.read_and_reset(),
        }
    }

    /// Lifetime totals, for diagnostics only
    pub fn accumulated(&self) -> TickCounts {
        TickCounts {
            left: self.left.accumulated(),
            right: self.right.accumulated(),
        }
    }
}
