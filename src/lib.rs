#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Halo: staged multi-pass post-processing driven by shared per-frame
//! motion signals.
//!
//! ```rust,ignore
//! use halo::{EffectStack, SignalHub, StackConfig};
//! use halo::renderer::graph::passes::{Bloom, ColorGrading};
//!
//! let hub = SignalHub::default();
//! let mut stack = EffectStack::new(StackConfig::default(), &hub, 1920, 1080);
//! stack.push_effect(Bloom::default())?;
//! stack.push_effect(ColorGrading::default())?;
//!
//! // every frame
//! hub.set_audio_levels(bass, mid, high);
//! stack.render_frame(&mut backend, scene_color, Some(scene_depth), clock.elapsed_seconds())?;
//! ```

pub mod errors;
pub mod renderer;
pub mod resources;
pub mod signals;
pub mod utils;

pub use errors::{HaloError, Result};
pub use renderer::backend::{CpuBackend, GpuBackend, RenderBackend};
pub use renderer::effect::{Effect, EffectController, EffectStatus};
pub use renderer::graph::passes::{Bloom, ColorGrading, DepthOfField, FilmGrain, GodRays, LensGlare};
pub use renderer::quality::{DeviceClass, QualityTier, TierParams, select_tier};
pub use renderer::stack::{EffectStack, StackConfig};
pub use signals::{HubConfig, SignalHub, SignalSnapshot};
pub use utils::Timer;
