//! God Rays Configuration
//!
//! Screen-space light shafts: bright sky pixels are masked, then smeared
//! radially toward a light position by a ray march. The march step count and
//! a scattering multiplier come from the quality tier; everything else lives
//! here.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::macros::impl_settings_api;
use crate::renderer::quality::TierParams;
use crate::signals::SignalSnapshot;

/// God-ray settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GodRaysSettings {
    /// Luminance above which sky pixels emit rays.
    threshold: f32,
    /// Depth at or beyond which a pixel counts as sky.
    sky_depth: f32,
    density: f32,
    /// Per-step falloff of the march.
    decay: f32,
    weight: f32,
    exposure: f32,
    /// Scattering strength before the tier scale is applied.
    scattering: f32,
    intensity: f32,
    bass_gain: f32,
    blessing_gain: f32,
    /// How far the light sinks (in UV) over the full scroll range.
    scroll_drift: f32,

    /// Light position in UV space (origin top-left).
    ///
    /// Default: `(0.5, 0.25)`
    light_position: Vec2,
    tint: Vec3,
}

impl Default for GodRaysSettings {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            sky_depth: 0.999,
            density: 0.9,
            decay: 0.95,
            weight: 0.4,
            exposure: 0.3,
            scattering: 1.0,
            intensity: 1.0,
            bass_gain: 0.5,
            blessing_gain: 0.5,
            scroll_drift: 0.2,
            light_position: Vec2::new(0.5, 0.25),
            tint: Vec3::new(1.0, 0.95, 0.85),
        }
    }
}

impl_settings_api!(GodRaysSettings, scalars: [
    (threshold, set_threshold, 0.0, 2.0, "Sky brightness threshold."),
    (sky_depth, set_sky_depth, 0.0, 1.0, "Depth from which a pixel is sky."),
    (density, set_density, 0.0, 2.0, "March length as a fraction of the light distance."),
    (decay, set_decay, 0.0, 1.0, "Per-step illumination decay."),
    (weight, set_weight, 0.0, 4.0, "Per-sample weight."),
    (exposure, set_exposure, 0.0, 4.0, "Exposure of the accumulated rays."),
    (scattering, set_scattering, 0.0, 4.0, "Scattering strength before tier scaling."),
    (intensity, set_intensity, 0.0, 4.0, "Composite intensity before modulation."),
    (bass_gain, set_bass_gain, 0.0, 4.0, "Intensity gain per unit of bass."),
    (blessing_gain, set_blessing_gain, 0.0, 4.0, "Intensity gain at the blessing-wave peak."),
    (scroll_drift, set_scroll_drift, -1.0, 1.0, "Vertical light drift over the scroll range."),
]);

impl GodRaysSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn light_position(&self) -> Vec2 {
        self.light_position
    }

    /// Sets the light position in UV space. Positions off screen are allowed.
    pub fn set_light_position(&mut self, position: Vec2) {
        if position.is_finite() {
            self.light_position = position;
        }
    }

    #[inline]
    #[must_use]
    pub fn tint(&self) -> Vec3 {
        self.tint
    }

    pub fn set_tint(&mut self, tint: Vec3) {
        self.tint = tint.max(Vec3::ZERO);
    }

    /// Scattering with the tier multiplier applied.
    #[must_use]
    pub fn scattering_for(&self, tier: &TierParams) -> f32 {
        self.scattering * tier.god_rays.scattering_scale
    }

    /// Light position after scroll drift.
    #[must_use]
    pub fn light_position_for(&self, signals: &SignalSnapshot) -> Vec2 {
        self.light_position + Vec2::new(0.0, signals.scroll_progress * self.scroll_drift)
    }

    #[must_use]
    pub fn intensity_for(&self, signals: &SignalSnapshot) -> f32 {
        self.intensity
            * (1.0 + signals.bass_level * self.bass_gain)
            * (1.0 + signals.blessing_pulse() * self.blessing_gain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::quality::select_tier;

    #[test]
    fn mobile_scattering_is_scaled_down() {
        let rays = GodRaysSettings::default();
        let desktop = rays.scattering_for(&select_tier(1920));
        let mobile = rays.scattering_for(&select_tier(400));
        assert!((mobile - desktop * 0.7).abs() < 1e-6);
    }

    #[test]
    fn non_finite_light_position_is_ignored() {
        let mut rays = GodRaysSettings::default();
        rays.set_light_position(Vec2::new(f32::NAN, 0.0));
        assert_eq!(rays.light_position(), Vec2::new(0.5, 0.25));
    }
}
