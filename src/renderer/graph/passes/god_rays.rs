//! God Rays
//!
//! Screen-space light scattering in three passes:
//!
//! ```text
//!  scene ─┐
//!  depth ─┴─► occlusion (1/d) ─► march (1/d) ─┐
//!  scene ──────────────────────────────────────┴─► composite ─► final
//! ```
//!
//! `occlusion` keeps bright pixels at sky depth. `march` walks from each
//! pixel toward the light position, accumulating decayed samples. The
//! resolution divisor `d`, the step count and a scattering multiplier come
//! from the tier, so constrained devices march fewer, weaker steps on a
//! smaller mask.

use glam::{Vec2, Vec3};

use super::resolve_slots;
use crate::errors::Result;
use crate::renderer::effect::Effect;
use crate::renderer::graph::params::ParamSlot;
use crate::renderer::graph::pass::{InputSource, PassDesc};
use crate::renderer::graph::pipeline::{BuildContext, Pipeline, PipelineBuilder};
use crate::renderer::graph::program::ShaderProgram;
use crate::renderer::graph::target_pool::TargetFormat;
use crate::resources::GodRaysSettings;
use crate::signals::SignalSnapshot;

fn occlusion_program() -> ShaderProgram {
    ShaderProgram::new("god_rays_occlusion", "god_rays_occlusion")
        .input("scene")
        .input("depth")
        .param("threshold", 0.7)
        .param("sky_depth", 0.999)
}

fn march_program() -> ShaderProgram {
    ShaderProgram::new("god_rays_march", "god_rays_march")
        .input("occlusion")
        .param("light_position", Vec2::new(0.5, 0.5))
        .param("steps", 16.0)
        .param("density", 1.0)
        .param("decay", 0.95)
        .param("weight", 0.5)
        .param("exposure", 0.3)
        .param("scattering", 1.0)
}

fn composite_program() -> ShaderProgram {
    ShaderProgram::new("god_rays_composite", "god_rays_composite")
        .input("scene")
        .input("rays")
        .param("intensity", 1.0)
        .param("tint", Vec3::ONE)
}

struct GodRaysSlots {
    threshold: ParamSlot,
    sky_depth: ParamSlot,
    light_position: ParamSlot,
    density: ParamSlot,
    decay: ParamSlot,
    weight: ParamSlot,
    exposure: ParamSlot,
    scattering: ParamSlot,
    intensity: ParamSlot,
    tint: ParamSlot,
}

impl GodRaysSlots {
    fn resolve(p: &Pipeline) -> Result<Self> {
        Ok(Self {
            threshold: p.slot("occlusion", "threshold")?,
            sky_depth: p.slot("occlusion", "sky_depth")?,
            light_position: p.slot("march", "light_position")?,
            density: p.slot("march", "density")?,
            decay: p.slot("march", "decay")?,
            weight: p.slot("march", "weight")?,
            exposure: p.slot("march", "exposure")?,
            scattering: p.slot("march", "scattering")?,
            intensity: p.slot("composite", "intensity")?,
            tint: p.slot("composite", "tint")?,
        })
    }
}

/// God-ray effect. Requires scene depth; frames without depth skip it.
pub struct GodRays {
    id: String,
    settings: GodRaysSettings,
    signals: SignalSnapshot,
    /// Tier multiplier captured at build.
    scattering_scale: f32,
    slots: Option<GodRaysSlots>,
}

impl Default for GodRays {
    fn default() -> Self {
        Self::new(GodRaysSettings::default())
    }
}

impl GodRays {
    #[must_use]
    pub fn new(settings: GodRaysSettings) -> Self {
        Self {
            id: "god_rays".to_string(),
            settings: settings.clamped(),
            signals: SignalSnapshot::default(),
            scattering_scale: 1.0,
            slots: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &GodRaysSettings {
        &self.settings
    }

    #[inline]
    pub fn settings_mut(&mut self) -> &mut GodRaysSettings {
        &mut self.settings
    }
}

impl Effect for GodRays {
    fn id(&self) -> &str {
        &self.id
    }

    fn build(&mut self, ctx: &mut BuildContext<'_>) -> Result<Pipeline> {
        let tier = *ctx.tier;
        let s = self.settings;
        let mut b = PipelineBuilder::new(self.id.clone(), ctx);

        let fraction = 1.0 / tier.god_rays.resolution_divisor.max(1) as f32;
        let mask = b.target("god_rays.occlusion", fraction, fraction, TargetFormat::Rgba16Float)?;
        let rays = b.target("god_rays.march", fraction, fraction, TargetFormat::Rgba16Float)?;

        let occlusion = b.add_pass(
            PassDesc::new("occlusion", occlusion_program())
                .input("scene", InputSource::PipelineInput)
                .input("depth", InputSource::Depth)
                .param("threshold", s.threshold())
                .param("sky_depth", s.sky_depth())
                .target(mask),
        )?;
        let march = b.add_pass(
            PassDesc::new("march", march_program())
                .input("occlusion", InputSource::Pass(occlusion))
                .param("light_position", s.light_position())
                .param("steps", tier.god_rays.steps.max(1) as f32)
                .param("density", s.density())
                .param("decay", s.decay())
                .param("weight", s.weight())
                .param("exposure", s.exposure())
                .param("scattering", s.scattering_for(&tier))
                .target(rays),
        )?;
        b.add_pass(
            PassDesc::new("composite", composite_program())
                .input("scene", InputSource::PipelineInput)
                .input("rays", InputSource::Pass(march))
                .param("intensity", s.intensity())
                .param("tint", s.tint())
                .to_final(),
        )?;

        let pipeline = b.build()?;
        let (pipeline, slots) = resolve_slots(ctx, pipeline, GodRaysSlots::resolve)?;
        self.scattering_scale = tier.god_rays.scattering_scale;
        self.slots = Some(slots);
        Ok(pipeline)
    }

    fn on_signals(&mut self, signals: &SignalSnapshot) {
        self.signals = *signals;
    }

    fn write_params(&self, pipeline: &mut Pipeline) {
        let Some(slots) = &self.slots else {
            return;
        };
        let s = &self.settings;
        pipeline.set(slots.threshold, s.threshold());
        pipeline.set(slots.sky_depth, s.sky_depth());
        pipeline.set(slots.light_position, s.light_position_for(&self.signals));
        pipeline.set(slots.density, s.density());
        pipeline.set(slots.decay, s.decay());
        pipeline.set(slots.weight, s.weight());
        pipeline.set(slots.exposure, s.exposure());
        pipeline.set(slots.scattering, s.scattering() * self.scattering_scale);
        pipeline.set(slots.intensity, s.intensity_for(&self.signals));
        pipeline.set(slots.tint, s.tint());
    }
}
