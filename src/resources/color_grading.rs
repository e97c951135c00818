//! Color Grading Configuration
//!
//! One-pass grade applied in this order: exposure, contrast, saturation,
//! lift/gain, gamma, warmth, vignette. The result is clamped to `[0, 1]`.
//! The defaults are an identity grade apart from the vignette.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::macros::impl_settings_api;
use crate::signals::SignalSnapshot;

/// Color grading settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorGradingSettings {
    /// Exposure in stops.
    exposure: f32,
    contrast: f32,
    saturation: f32,
    vignette: f32,
    /// Normalized distance from the center where the vignette starts.
    vignette_radius: f32,
    /// Warm (positive) or cool (negative) shift.
    warmth: f32,
    /// Warmth added over the full scroll range.
    warmth_scroll: f32,
    /// Extra exposure (stops) at the blessing-wave peak.
    blessing_exposure: f32,

    lift: Vec3,
    gamma: Vec3,
    gain: Vec3,
}

impl Default for ColorGradingSettings {
    fn default() -> Self {
        Self {
            exposure: 0.0,
            contrast: 1.0,
            saturation: 1.0,
            vignette: 0.3,
            vignette_radius: 0.6,
            warmth: 0.0,
            warmth_scroll: 0.3,
            blessing_exposure: 0.25,
            lift: Vec3::ZERO,
            gamma: Vec3::ONE,
            gain: Vec3::ONE,
        }
    }
}

impl_settings_api!(ColorGradingSettings, scalars: [
    (exposure, set_exposure, -4.0, 4.0, "Exposure in stops."),
    (contrast, set_contrast, 0.0, 3.0, "Contrast around mid grey."),
    (saturation, set_saturation, 0.0, 3.0, "Saturation; 0 is greyscale."),
    (vignette, set_vignette, 0.0, 1.0, "Vignette strength."),
    (vignette_radius, set_vignette_radius, 0.0, 1.0, "Vignette start radius."),
    (warmth, set_warmth, -1.0, 1.0, "Static warmth shift."),
    (warmth_scroll, set_warmth_scroll, -1.0, 1.0, "Warmth added over the scroll range."),
    (blessing_exposure, set_blessing_exposure, 0.0, 2.0, "Exposure boost at the blessing-wave peak."),
]);

impl ColorGradingSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A grade that leaves every in-range color unchanged.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            vignette: 0.0,
            warmth_scroll: 0.0,
            blessing_exposure: 0.0,
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn lift(&self) -> Vec3 {
        self.lift
    }

    #[inline]
    #[must_use]
    pub fn gamma(&self) -> Vec3 {
        self.gamma
    }

    #[inline]
    #[must_use]
    pub fn gain(&self) -> Vec3 {
        self.gain
    }

    pub fn set_lift(&mut self, lift: Vec3) {
        self.lift = lift.clamp(Vec3::splat(-1.0), Vec3::ONE);
    }

    /// Sets per-channel gamma. Channels are kept above zero.
    pub fn set_gamma(&mut self, gamma: Vec3) {
        self.gamma = gamma.clamp(Vec3::splat(0.01), Vec3::splat(4.0));
    }

    pub fn set_gain(&mut self, gain: Vec3) {
        self.gain = gain.clamp(Vec3::ZERO, Vec3::splat(4.0));
    }

    #[must_use]
    pub fn exposure_for(&self, signals: &SignalSnapshot) -> f32 {
        self.exposure + signals.blessing_pulse() * self.blessing_exposure
    }

    #[must_use]
    pub fn warmth_for(&self, signals: &SignalSnapshot) -> f32 {
        (self.warmth + signals.scroll_progress * self.warmth_scroll).clamp(-1.0, 1.0)
    }
}
