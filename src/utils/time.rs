//! Host frame clock.
//!
//! Produces the monotonic wall-clock seconds fed to
//! [`SignalHub::tick`](crate::signals::SignalHub::tick). The hub does its own
//! delta clamping, so the raw (unclamped) delta reported here may be large
//! after a stall or a backgrounded tab.

#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

/// Frame clock.
pub struct Timer {
    start_time: Instant,
    last_update: Instant,
    /// Raw time since the previous tick.
    pub delta: Duration,
    /// Time since creation (or the last [`reset`](Self::reset)).
    pub elapsed: Duration,
    pub frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_update: now,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Samples the clock. Call once per rendered frame.
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last_update;
        self.elapsed = now - self.start_time;
        self.last_update = now;
        self.frame_count += 1;
    }

    /// Restarts the clock at zero.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Elapsed time in seconds, as consumed by the signal hub.
    #[inline]
    #[must_use]
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    #[inline]
    #[must_use]
    pub fn dt_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }
}
