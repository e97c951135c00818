//! Depth of Field
//!
//! ```text
//!  depth ─► coc (R16) ──────────┬──────────┬───────────┐
//!  scene ─────────────► blur_h ─┴► blur_v ─┴► composite ◄─ scene
//! ```
//!
//! The separable blur runs horizontally then vertically through two distinct
//! targets, scaled per pixel by the circle of confusion. Tap count comes from
//! the tier; the blur step is derived from the viewport captured at build.

use glam::Vec2;

use super::resolve_slots;
use crate::errors::Result;
use crate::renderer::effect::Effect;
use crate::renderer::graph::params::ParamSlot;
use crate::renderer::graph::pass::{InputSource, PassDesc};
use crate::renderer::graph::pipeline::{BuildContext, Pipeline, PipelineBuilder};
use crate::renderer::graph::program::ShaderProgram;
use crate::renderer::graph::target_pool::TargetFormat;
use crate::resources::DepthOfFieldSettings;
use crate::signals::SignalSnapshot;

fn coc_program() -> ShaderProgram {
    ShaderProgram::new("dof_coc", "dof_coc")
        .input("depth")
        .param("focus_distance", 0.5)
        .param("focus_range", 0.2)
        .param("max_coc", 1.0)
}

fn blur_program() -> ShaderProgram {
    ShaderProgram::new("dof_blur", "dof_blur")
        .input("source")
        .input("coc")
        .param("direction", Vec2::ZERO)
        .param("taps", 9.0)
}

fn composite_program() -> ShaderProgram {
    ShaderProgram::new("dof_composite", "dof_composite")
        .input("scene")
        .input("blurred")
        .input("coc")
}

struct DepthOfFieldSlots {
    focus_distance: ParamSlot,
    focus_range: ParamSlot,
    max_coc: ParamSlot,
    blur_h: ParamSlot,
    blur_v: ParamSlot,
}

/// Depth-of-field effect. Requires scene depth.
pub struct DepthOfField {
    id: String,
    settings: DepthOfFieldSettings,
    signals: SignalSnapshot,
    viewport: (u32, u32),
    slots: Option<DepthOfFieldSlots>,
}

impl Default for DepthOfField {
    fn default() -> Self {
        Self::new(DepthOfFieldSettings::default())
    }
}

impl DepthOfField {
    #[must_use]
    pub fn new(settings: DepthOfFieldSettings) -> Self {
        Self {
            id: "depth_of_field".to_string(),
            settings: settings.clamped(),
            signals: SignalSnapshot::default(),
            viewport: (1, 1),
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
    pub fn settings(&self) -> &DepthOfFieldSettings {
        &self.settings
    }

    #[inline]
    pub fn settings_mut(&mut self) -> &mut DepthOfFieldSettings {
        &mut self.settings
    }

    /// Horizontal and vertical blur steps in UV for the built viewport.
    fn blur_steps(&self) -> (Vec2, Vec2) {
        let r = self.settings.max_radius();
        let (w, h) = self.viewport;
        (
            Vec2::new(r / w.max(1) as f32, 0.0),
            Vec2::new(0.0, r / h.max(1) as f32),
        )
    }
}

impl Effect for DepthOfField {
    fn id(&self) -> &str {
        &self.id
    }

    fn build(&mut self, ctx: &mut BuildContext<'_>) -> Result<Pipeline> {
        let taps = ctx.tier.blur.kernel_taps.max(1) as f32;
        self.viewport = ctx.viewport();
        let (step_h, step_v) = self.blur_steps();
        let s = self.settings;

        let mut b = PipelineBuilder::new(self.id.clone(), ctx);
        let coc_target = b.target("dof.coc", 1.0, 1.0, TargetFormat::R16Float)?;
        let blur_h_target = b.target("dof.blur_h", 1.0, 1.0, TargetFormat::Rgba16Float)?;
        let blur_v_target = b.target("dof.blur_v", 1.0, 1.0, TargetFormat::Rgba16Float)?;

        let coc = b.add_pass(
            PassDesc::new("coc", coc_program())
                .input("depth", InputSource::Depth)
                .param("focus_distance", s.focus_distance())
                .param("focus_range", s.focus_range())
                .param("max_coc", s.aperture())
                .target(coc_target),
        )?;
        let blur_h = b.add_pass(
            PassDesc::new("blur_h", blur_program())
                .input("source", InputSource::PipelineInput)
                .input("coc", InputSource::Pass(coc))
                .param("direction", step_h)
                .param("taps", taps)
                .target(blur_h_target),
        )?;
        let blur_v = b.add_pass(
            PassDesc::new("blur_v", blur_program())
                .input("source", InputSource::Pass(blur_h))
                .input("coc", InputSource::Pass(coc))
                .param("direction", step_v)
                .param("taps", taps)
                .target(blur_v_target),
        )?;
        b.add_pass(
            PassDesc::new("composite", composite_program())
                .input("scene", InputSource::PipelineInput)
                .input("blurred", InputSource::Pass(blur_v))
                .input("coc", InputSource::Pass(coc))
                .to_final(),
        )?;

        let pipeline = b.build()?;
        let (pipeline, slots) = resolve_slots(ctx, pipeline, |p| {
            Ok(DepthOfFieldSlots {
                focus_distance: p.slot("coc", "focus_distance")?,
                focus_range: p.slot("coc", "focus_range")?,
                max_coc: p.slot("coc", "max_coc")?,
                blur_h: p.slot("blur_h", "direction")?,
                blur_v: p.slot("blur_v", "direction")?,
            })
        })?;
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
        let (step_h, step_v) = self.blur_steps();
        pipeline.set(slots.focus_distance, self.settings.focus_distance_for(&self.signals));
        pipeline.set(slots.focus_range, self.settings.focus_range());
        pipeline.set(slots.max_coc, self.settings.max_coc_for(&self.signals));
        pipeline.set(slots.blur_h, step_h);
        pipeline.set(slots.blur_v, step_v);
    }
}
