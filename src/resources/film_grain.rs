//! Film Grain Configuration

use serde::{Deserialize, Serialize};

use super::macros::impl_settings_api;
use crate::renderer::quality::TierParams;
use crate::signals::SignalSnapshot;

/// Film grain settings.
///
/// Grain is luminance noise re-seeded 24 times a second, weakened in bright
/// areas by `response`. An optional chroma term and sparse dust specks sit
/// on top; both are reduced or removed on cheaper tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilmGrainSettings {
    intensity: f32,
    /// Grain cell size in pixels.
    grain_size: f32,
    /// How strongly highlights suppress grain.
    response: f32,
    chroma_intensity: f32,
    dust_density: f32,
    /// Intensity gain per unit of high band.
    high_gain: f32,
}

impl Default for FilmGrainSettings {
    fn default() -> Self {
        Self {
            intensity: 0.06,
            grain_size: 1.5,
            response: 0.6,
            chroma_intensity: 0.5,
            dust_density: 0.3,
            high_gain: 0.5,
        }
    }
}

impl_settings_api!(FilmGrainSettings, scalars: [
    (intensity, set_intensity, 0.0, 1.0, "Grain amplitude."),
    (grain_size, set_grain_size, 1.0, 8.0, "Grain cell size in pixels."),
    (response, set_response, 0.0, 1.0, "Highlight suppression."),
    (chroma_intensity, set_chroma_intensity, 0.0, 1.0, "Chroma noise relative to luminance grain."),
    (dust_density, set_dust_density, 0.0, 1.0, "Dust speck density."),
    (high_gain, set_high_gain, 0.0, 4.0, "Intensity gain per unit of high band."),
]);

impl FilmGrainSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn intensity_for(&self, signals: &SignalSnapshot) -> f32 {
        self.intensity * (1.0 + signals.high_level * self.high_gain)
    }

    /// Chroma amount; zero on tiers without chroma noise.
    #[must_use]
    pub fn chroma_for(&self, tier: &TierParams) -> f32 {
        if tier.grain.chroma_noise {
            self.chroma_intensity
        } else {
            0.0
        }
    }

    #[must_use]
    pub fn dust_for(&self, tier: &TierParams) -> f32 {
        self.dust_density * tier.grain.dust_scale
    }
}
