//! Lens Glare Configuration
//!
//! Anamorphic streaks plus an optional starburst of ghost images mirrored
//! through the frame center. Streak sample counts and whether the starburst
//! pass exists at all are tier decisions; the starburst settings below are
//! simply unused on tiers without it.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::macros::impl_settings_api;
use crate::signals::SignalSnapshot;

/// Lens glare settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensGlareSettings {
    threshold: f32,
    intensity: f32,
    /// Distance between streak samples, in source texels.
    streak_length: f32,
    /// Weight falloff per streak sample.
    attenuation: f32,
    /// Whole number of ghosts; stored as `f32` so it travels as a parameter.
    ghost_count: f32,
    ghost_spacing: f32,
    ghost_intensity: f32,
    high_gain: f32,
    blessing_gain: f32,
    tint: Vec3,
}

impl Default for LensGlareSettings {
    fn default() -> Self {
        Self {
            threshold: 0.9,
            intensity: 0.5,
            streak_length: 2.0,
            attenuation: 0.85,
            ghost_count: 4.0,
            ghost_spacing: 0.35,
            ghost_intensity: 0.5,
            high_gain: 0.6,
            blessing_gain: 0.5,
            tint: Vec3::new(0.9, 0.95, 1.0),
        }
    }
}

impl_settings_api!(LensGlareSettings, scalars: [
    (threshold, set_threshold, 0.0, 2.0, "Brightness threshold of glare sources."),
    (intensity, set_intensity, 0.0, 4.0, "Composite intensity before modulation."),
    (streak_length, set_streak_length, 0.0, 8.0, "Streak sample spacing in texels."),
    (attenuation, set_attenuation, 0.0, 1.0, "Per-sample streak falloff."),
    (ghost_count, set_ghost_count, 0.0, 8.0, "Number of starburst ghosts."),
    (ghost_spacing, set_ghost_spacing, 0.0, 1.0, "Ghost spacing toward the frame center."),
    (ghost_intensity, set_ghost_intensity, 0.0, 4.0, "Combined ghost strength."),
    (high_gain, set_high_gain, 0.0, 4.0, "Intensity gain per unit of high band."),
    (blessing_gain, set_blessing_gain, 0.0, 4.0, "Intensity gain at the blessing-wave peak."),
]);

impl LensGlareSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ghost count rounded to a whole number.
    #[must_use]
    pub fn ghosts(&self) -> f32 {
        self.ghost_count.round()
    }

    #[inline]
    #[must_use]
    pub fn tint(&self) -> Vec3 {
        self.tint
    }

    pub fn set_tint(&mut self, tint: Vec3) {
        self.tint = tint.max(Vec3::ZERO);
    }

    #[must_use]
    pub fn intensity_for(&self, signals: &SignalSnapshot) -> f32 {
        self.intensity
            * (1.0 + signals.high_level * self.high_gain)
            * (1.0 + signals.blessing_pulse() * self.blessing_gain)
    }
}
