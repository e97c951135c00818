//! Lens Glare
//!
//! ```text
//!  scene ─► bright (½) ─► streak_h (½) ─► streak_v (½) ─► [starburst (½)] ─┐
//!  scene ─────────────────────────────────────────────────────────────────┴─► composite
//! ```
//!
//! The starburst pass only exists on tiers that enable it; its absence
//! changes the pass count, not a per-frame branch.

use glam::{Vec2, Vec3};

use super::resolve_slots;
use crate::errors::Result;
use crate::renderer::effect::Effect;
use crate::renderer::graph::params::ParamSlot;
use crate::renderer::graph::pass::{InputSource, PassDesc};
use crate::renderer::graph::pipeline::{BuildContext, Pipeline, PipelineBuilder};
use crate::renderer::graph::program::ShaderProgram;
use crate::renderer::graph::target_pool::TargetFormat;
use crate::resources::LensGlareSettings;
use crate::signals::SignalSnapshot;

fn bright_program() -> ShaderProgram {
    ShaderProgram::new("glare_bright", "glare_bright")
        .input("scene")
        .param("threshold", 0.9)
}

fn streak_program() -> ShaderProgram {
    ShaderProgram::new("glare_streak", "glare_streak")
        .input("source")
        .param("direction", Vec2::ZERO)
        .param("samples", 8.0)
        .param("attenuation", 0.85)
}

fn starburst_program() -> ShaderProgram {
    ShaderProgram::new("glare_starburst", "glare_starburst")
        .input("source")
        .param("ghosts", 4.0)
        .param("spacing", 0.35)
        .param("ghost_intensity", 0.5)
}

fn composite_program() -> ShaderProgram {
    ShaderProgram::new("glare_composite", "glare_composite")
        .input("scene")
        .input("glare")
        .param("intensity", 0.5)
        .param("tint", Vec3::ONE)
}

struct StarburstSlots {
    ghosts: ParamSlot,
    spacing: ParamSlot,
    ghost_intensity: ParamSlot,
}

struct LensGlareSlots {
    threshold: ParamSlot,
    streak_h: ParamSlot,
    streak_v: ParamSlot,
    attenuation_h: ParamSlot,
    attenuation_v: ParamSlot,
    starburst: Option<StarburstSlots>,
    intensity: ParamSlot,
    tint: ParamSlot,
}

impl LensGlareSlots {
    fn resolve(p: &Pipeline) -> Result<Self> {
        let starburst = if p.pass("starburst").is_some() {
            Some(StarburstSlots {
                ghosts: p.slot("starburst", "ghosts")?,
                spacing: p.slot("starburst", "spacing")?,
                ghost_intensity: p.slot("starburst", "ghost_intensity")?,
            })
        } else {
            None
        };
        Ok(Self {
            threshold: p.slot("bright", "threshold")?,
            streak_h: p.slot("streak_h", "direction")?,
            streak_v: p.slot("streak_v", "direction")?,
            attenuation_h: p.slot("streak_h", "attenuation")?,
            attenuation_v: p.slot("streak_v", "attenuation")?,
            starburst,
            intensity: p.slot("composite", "intensity")?,
            tint: p.slot("composite", "tint")?,
        })
    }
}

/// Lens glare effect.
pub struct LensGlare {
    id: String,
    settings: LensGlareSettings,
    signals: SignalSnapshot,
    /// Size of the half-resolution glare targets.
    glare_size: (u32, u32),
    slots: Option<LensGlareSlots>,
}

impl Default for LensGlare {
    fn default() -> Self {
        Self::new(LensGlareSettings::default())
    }
}

impl LensGlare {
    #[must_use]
    pub fn new(settings: LensGlareSettings) -> Self {
        Self {
            id: "lens_glare".to_string(),
            settings: settings.clamped(),
            signals: SignalSnapshot::default(),
            glare_size: (1, 1),
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
    pub fn settings(&self) -> &LensGlareSettings {
        &self.settings
    }

    #[inline]
    pub fn settings_mut(&mut self) -> &mut LensGlareSettings {
        &mut self.settings
    }

    fn streak_steps(&self) -> (Vec2, Vec2) {
        let len = self.settings.streak_length();
        let (w, h) = self.glare_size;
        (
            Vec2::new(len / w.max(1) as f32, 0.0),
            Vec2::new(0.0, len / h.max(1) as f32),
        )
    }
}

impl Effect for LensGlare {
    fn id(&self) -> &str {
        &self.id
    }

    fn build(&mut self, ctx: &mut BuildContext<'_>) -> Result<Pipeline> {
        let tier = *ctx.tier;
        let s = self.settings;
        let samples = tier.glare.streak_samples as f32;

        let mut b = PipelineBuilder::new(self.id.clone(), ctx);
        let bright_target = b.target("glare.bright", 0.5, 0.5, TargetFormat::Rgba16Float)?;
        let streak_h_target = b.target("glare.streak_h", 0.5, 0.5, TargetFormat::Rgba16Float)?;
        let streak_v_target = b.target("glare.streak_v", 0.5, 0.5, TargetFormat::Rgba16Float)?;
        self.glare_size = bright_target.size();
        let (step_h, step_v) = self.streak_steps();

        let bright = b.add_pass(
            PassDesc::new("bright", bright_program())
                .input("scene", InputSource::PipelineInput)
                .param("threshold", s.threshold())
                .target(bright_target),
        )?;
        let streak_h = b.add_pass(
            PassDesc::new("streak_h", streak_program())
                .input("source", InputSource::Pass(bright))
                .param("direction", step_h)
                .param("samples", samples)
                .param("attenuation", s.attenuation())
                .target(streak_h_target),
        )?;
        let mut glare = b.add_pass(
            PassDesc::new("streak_v", streak_program())
                .input("source", InputSource::Pass(streak_h))
                .param("direction", step_v)
                .param("samples", samples)
                .param("attenuation", s.attenuation())
                .target(streak_v_target),
        )?;

        if tier.glare.starburst {
            let target = b.target("glare.starburst", 0.5, 0.5, TargetFormat::Rgba16Float)?;
            glare = b.add_pass(
                PassDesc::new("starburst", starburst_program())
                    .input("source", InputSource::Pass(glare))
                    .param("ghosts", s.ghosts())
                    .param("spacing", s.ghost_spacing())
                    .param("ghost_intensity", s.ghost_intensity())
                    .target(target),
            )?;
        }

        b.add_pass(
            PassDesc::new("composite", composite_program())
                .input("scene", InputSource::PipelineInput)
                .input("glare", InputSource::Pass(glare))
                .param("intensity", s.intensity())
                .param("tint", s.tint())
                .to_final(),
        )?;

        let pipeline = b.build()?;
        let (pipeline, slots) = resolve_slots(ctx, pipeline, LensGlareSlots::resolve)?;
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
        let (step_h, step_v) = self.streak_steps();
        pipeline.set(slots.threshold, s.threshold());
        pipeline.set(slots.streak_h, step_h);
        pipeline.set(slots.streak_v, step_v);
        pipeline.set(slots.attenuation_h, s.attenuation());
        pipeline.set(slots.attenuation_v, s.attenuation());
        if let Some(star) = &slots.starburst {
            pipeline.set(star.ghosts, s.ghosts());
            pipeline.set(star.spacing, s.ghost_spacing());
            pipeline.set(star.ghost_intensity, s.ghost_intensity());
        }
        pipeline.set(slots.intensity, s.intensity_for(&self.signals));
        pipeline.set(slots.tint, s.tint());
    }
}
