//! Timestamp sources for trace sessions.
//!
//! A [`Clock`] hands out monotonic ticks and converts tick differences to
//! microseconds. The session reads a capture origin from the clock at every
//! `capture_start`, and all recorded timestamps are relative to it.
//!
//! [`WallTime`] is the default. Tests use `testing_common::ManualClock`,
//! which only moves when told to.

use std::time::Instant;

/// A monotonic tick source.
pub trait Clock: Send + Sync + 'static {
    /// Current tick count. Must never decrease.
    fn now(&self) -> u64;

    /// Converts a tick count (or a difference of two) to whole microseconds,
    /// rounding down.
    fn ticks_to_micros(&self, ticks: u64) -> u64;
}

/// "Monotonic clock" with nanosecond ticks (using [`std::time::Instant`]).
#[derive(Debug)]
pub struct WallTime {
    start: Instant,
}

impl WallTime {
    pub fn new() -> Self {
        WallTime {
            start: Instant::now(),
        }
    }
}

impl Default for WallTime {
    fn default() -> Self {
        WallTime::new()
    }
}

impl Clock for WallTime {
    #[inline]
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    #[inline]
    fn ticks_to_micros(&self, ticks: u64) -> u64 {
        ticks / 1_000
    }
}
