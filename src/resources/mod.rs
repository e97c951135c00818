//! Effect Parameter Surfaces
//!
//! Plain settings structs, one per effect. They carry the host-tunable
//! defaults and ranges; animated state driven by signals lives in the
//! effects themselves (`renderer::graph::passes`).
//!
//! Every struct derives `Serialize`/`Deserialize` with `#[serde(default)]`,
//! so a partial configuration document only overrides what it names:
//!
//! ```rust,ignore
//! let bloom: BloomSettings = serde_json::from_str(r#"{ "threshold": 0.9 }"#)?;
//! let bloom = bloom.clamped();
//! ```

mod macros;

pub mod bloom;
pub mod color_grading;
pub mod depth_of_field;
pub mod film_grain;
pub mod god_rays;
pub mod lens_glare;

pub use bloom::BloomSettings;
pub use color_grading::ColorGradingSettings;
pub use depth_of_field::DepthOfFieldSettings;
pub use film_grain::FilmGrainSettings;
pub use god_rays::GodRaysSettings;
pub use lens_glare::LensGlareSettings;

/// Clamps a parameter into `[min, max]`; NaN becomes `min`.
#[inline]
#[must_use]
pub fn clamp_param(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}
