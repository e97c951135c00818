//! Per-frame signal bundle.

use serde::{Deserialize, Serialize};

/// The shared motion signals of one frame.
///
/// Computed once per frame by the [`SignalHub`](super::SignalHub) and handed
/// to every subscriber by shared reference. Every subscriber of a frame sees
/// the same instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    /// Monotonic frame counter, starting at 1 for the first tick.
    pub frame: u64,
    /// Host wall-clock time in seconds, as passed to the tick.
    pub wall_clock_time: f64,
    /// Animation time: the sum of all clamped deltas.
    pub elapsed: f32,
    /// Clamped frame delta in seconds.
    pub delta_time: f32,
    /// Page/scene scroll progress in `[0, 1]`.
    pub scroll_progress: f32,
    /// Audio band energies in `[0, 1]`.
    pub bass_level: f32,
    pub mid_level: f32,
    pub high_level: f32,
    /// Progress of the scripted full-screen pulse in `[0, 1]`.
    pub blessing_wave_progress: f32,
    /// Camera vertical field of view in degrees.
    pub camera_fov: f32,
}

impl SignalSnapshot {
    /// Pulse envelope of the blessing wave: `sin(π · progress)`, zero at both
    /// ends of the wave and 1 at its crest.
    #[inline]
    #[must_use]
    pub fn blessing_pulse(&self) -> f32 {
        (std::f32::consts::PI * self.blessing_wave_progress).sin().max(0.0)
    }

    /// Mean of the three audio bands.
    #[inline]
    #[must_use]
    pub fn audio_energy(&self) -> f32 {
        (self.bass_level + self.mid_level + self.high_level) / 3.0
    }
}

impl Default for SignalSnapshot {
    fn default() -> Self {
        Self {
            frame: 0,
            wall_clock_time: 0.0,
            elapsed: 0.0,
            delta_time: 0.0,
            scroll_progress: 0.0,
            bass_level: 0.0,
            mid_level: 0.0,
            high_level: 0.0,
            blessing_wave_progress: 0.0,
            camera_fov: 60.0,
        }
    }
}
