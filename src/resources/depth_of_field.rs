//! Depth of Field Configuration
//!
//! The circle of confusion is computed from linear depth in `[0, 1]`:
//!
//! ```text
//! coc = saturate(|depth - focus_distance| / focus_range * max_coc)
//! max_coc = aperture * reference_fov / camera_fov
//! ```
//!
//! Narrowing the field of view (zooming in) therefore strengthens the blur,
//! like a longer lens at the same aperture.

use serde::{Deserialize, Serialize};

use super::macros::impl_settings_api;
use crate::signals::SignalSnapshot;

/// Depth-of-field settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthOfFieldSettings {
    /// Linear depth in focus.
    focus_distance: f32,
    /// Depth band around `focus_distance` that stays sharp.
    focus_range: f32,
    /// Blur strength at the reference field of view.
    aperture: f32,
    /// Largest blur radius in pixels.
    ///
    /// Baked into the blur step at build time.
    max_radius: f32,
    /// Field of view (degrees) at which `aperture` applies unscaled.
    reference_fov: f32,
    /// Focus-distance change over the full scroll range.
    scroll_focus_shift: f32,
}

impl Default for DepthOfFieldSettings {
    fn default() -> Self {
        Self {
            focus_distance: 0.5,
            focus_range: 0.2,
            aperture: 0.5,
            max_radius: 8.0,
            reference_fov: 60.0,
            scroll_focus_shift: 0.0,
        }
    }
}

impl_settings_api!(DepthOfFieldSettings, scalars: [
    (focus_distance, set_focus_distance, 0.0, 1.0, "Linear depth in focus."),
    (focus_range, set_focus_range, 0.001, 1.0, "Width of the sharp depth band."),
    (aperture, set_aperture, 0.0, 1.0, "Blur strength at the reference FOV."),
    (max_radius, set_max_radius, 0.0, 32.0, "Largest blur radius in pixels."),
    (reference_fov, set_reference_fov, 20.0, 120.0, "FOV at which the aperture applies unscaled."),
    (scroll_focus_shift, set_scroll_focus_shift, -1.0, 1.0, "Focus shift over the scroll range."),
]);

impl DepthOfFieldSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Focus distance after scroll shift, kept in `[0, 1]`.
    #[must_use]
    pub fn focus_distance_for(&self, signals: &SignalSnapshot) -> f32 {
        (self.focus_distance + signals.scroll_progress * self.scroll_focus_shift).clamp(0.0, 1.0)
    }

    /// Maximum circle of confusion for the current camera FOV.
    #[must_use]
    pub fn max_coc_for(&self, signals: &SignalSnapshot) -> f32 {
        let fov = signals.camera_fov.max(1.0);
        (self.aperture * self.reference_fov / fov).min(4.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zooming_in_strengthens_blur() {
        let dof = DepthOfFieldSettings::default();
        let wide = SignalSnapshot {
            camera_fov: 60.0,
            ..SignalSnapshot::default()
        };
        let narrow = SignalSnapshot {
            camera_fov: 30.0,
            ..SignalSnapshot::default()
        };
        assert_eq!(dof.max_coc_for(&wide), dof.aperture());
        assert!(dof.max_coc_for(&narrow) > dof.max_coc_for(&wide));
    }

    #[test]
    fn focus_range_never_reaches_zero() {
        let mut dof = DepthOfFieldSettings::default();
        dof.set_focus_range(0.0);
        assert!(dof.focus_range() > 0.0);
    }
}
