//! Bloom Configuration
//!
//! Pure data for the [`Bloom`](crate::renderer::graph::passes::Bloom) pyramid. The
//! static fields are set by the host; the `*_for` methods derive the animated
//! per-frame values from a [`SignalSnapshot`].
//!
//! Audio drives bloom three ways:
//!
//! - **bass** lowers the extraction threshold and widens the upsample spread,
//!   so kicks make more of the frame glow and the glow reach further;
//! - **bass / mid / high** scale the composite intensity;
//! - the **blessing wave** multiplies the intensity by a `sin(π·p)` pulse.
//!
//! With all signals at zero the derived values equal the static settings.

use serde::{Deserialize, Serialize};

use super::macros::impl_settings_api;
use crate::signals::SignalSnapshot;

/// Bloom pyramid settings.
///
/// # Usage
///
/// ```rust,ignore
/// let mut bloom = BloomSettings::default();
/// bloom.set_threshold(0.9);
/// bloom.set_strength(0.4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomSettings {
    /// Luminance above which pixels contribute to bloom.
    ///
    /// Default: `0.85`
    threshold: f32,

    /// Composite intensity before signal modulation.
    ///
    /// Default: `0.6`
    strength: f32,

    /// Weight of each coarser level when folded into the next finer one.
    ///
    /// Default: `0.75`
    radius: f32,

    /// How far full bass lowers the threshold.
    bass_threshold_drop: f32,
    /// How much full bass adds to the upsample spread.
    bass_width_boost: f32,

    bass_gain: f32,
    mid_gain: f32,
    high_gain: f32,
    blessing_gain: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            strength: 0.6,
            radius: 0.75,
            bass_threshold_drop: 0.25,
            bass_width_boost: 0.35,
            bass_gain: 0.8,
            mid_gain: 0.3,
            high_gain: 0.2,
            blessing_gain: 1.0,
        }
    }
}

impl_settings_api!(BloomSettings, scalars: [
    (threshold, set_threshold, 0.0, 2.0, "Extraction threshold (luminance)."),
    (strength, set_strength, 0.0, 4.0, "Composite intensity before modulation."),
    (radius, set_radius, 0.0, 2.0, "Upsample spread before modulation."),
    (bass_threshold_drop, set_bass_threshold_drop, 0.0, 1.0, "Threshold reduction at full bass."),
    (bass_width_boost, set_bass_width_boost, 0.0, 2.0, "Spread increase at full bass."),
    (bass_gain, set_bass_gain, 0.0, 4.0, "Intensity gain per unit of bass."),
    (mid_gain, set_mid_gain, 0.0, 4.0, "Intensity gain per unit of mid."),
    (high_gain, set_high_gain, 0.0, 4.0, "Intensity gain per unit of high."),
    (blessing_gain, set_blessing_gain, 0.0, 4.0, "Intensity gain at the blessing-wave peak."),
]);

impl BloomSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Threshold for this frame: `max(0, threshold - bass * drop)`.
    #[must_use]
    pub fn threshold_for(&self, signals: &SignalSnapshot) -> f32 {
        (self.threshold - signals.bass_level * self.bass_threshold_drop).max(0.0)
    }

    /// Upsample spread for this frame: `radius + bass * width_boost`.
    #[must_use]
    pub fn spread_for(&self, signals: &SignalSnapshot) -> f32 {
        self.radius + signals.bass_level * self.bass_width_boost
    }

    /// Composite intensity for this frame.
    #[must_use]
    pub fn intensity_for(&self, signals: &SignalSnapshot) -> f32 {
        let audio = 1.0
            + signals.bass_level * self.bass_gain
            + signals.mid_level * self.mid_gain
            + signals.high_level * self.high_gain;
        let pulse = 1.0 + signals.blessing_pulse() * self.blessing_gain;
        self.strength * audio * pulse
    }
}
