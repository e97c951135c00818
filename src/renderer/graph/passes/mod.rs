//! Effect Pipelines
//!
//! One module per effect. Each effect type implements
//! [`Effect`](crate::renderer::effect::Effect): it declares its shader
//! programs, builds its pass chain against the current viewport and tier,
//! and turns signal snapshots into per-frame parameter writes.
//!
//! | Effect | Passes | Depth |
//! |--------|--------|-------|
//! | [`Bloom`] | threshold, down1..=N, up(N-1)..=up0, composite | no |
//! | [`GodRays`] | occlusion, march, composite | yes |
//! | [`DepthOfField`] | coc, blur_h, blur_v, composite | yes |
//! | [`LensGlare`] | bright, streak_h, streak_v, (starburst), composite | no |
//! | [`FilmGrain`] | grain | no |
//! | [`ColorGrading`] | grade | no |

mod bloom;
mod color_grading;
mod depth_of_field;
mod film_grain;
mod god_rays;
mod lens_glare;

pub use bloom::{Bloom, pyramid_sizes};
pub use color_grading::ColorGrading;
pub use depth_of_field::DepthOfField;
pub use film_grain::FilmGrain;
pub use god_rays::GodRays;
pub use lens_glare::LensGlare;

use glam::Vec2;

use super::pipeline::{BuildContext, Pipeline};
use super::program::ShaderProgram;
use crate::errors::Result;

/// Plain copy of the input. Used by the stack when no effect writes the
/// presentation surface.
#[must_use]
pub fn blit_program() -> ShaderProgram {
    ShaderProgram::new("blit", "blit").input("source")
}

/// UV size of one texel of a `width × height` texture.
#[inline]
#[must_use]
pub fn texel_size((width, height): (u32, u32)) -> Vec2 {
    Vec2::new(1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32)
}

/// Resolves an effect's parameter slots on a freshly built pipeline,
/// releasing the pipeline's targets if resolution fails.
pub(crate) fn resolve_slots<S>(
    ctx: &mut BuildContext<'_>,
    pipeline: Pipeline,
    resolve: impl FnOnce(&Pipeline) -> Result<S>,
) -> Result<(Pipeline, S)> {
    match resolve(&pipeline) {
        Ok(slots) => Ok((pipeline, slots)),
        Err(err) => {
            pipeline.release(ctx.pool);
            Err(err)
        }
    }
}
