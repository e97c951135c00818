//! Color Grading
//!
//! Single pass: exposure, contrast, saturation, lift/gamma/gain, warmth and
//! vignette. Usually the last effect of a stack, since it clamps to LDR.

use glam::Vec3;

use super::resolve_slots;
use crate::errors::Result;
use crate::renderer::effect::Effect;
use crate::renderer::graph::params::ParamSlot;
use crate::renderer::graph::pass::{InputSource, PassDesc};
use crate::renderer::graph::pipeline::{BuildContext, Pipeline, PipelineBuilder};
use crate::renderer::graph::program::ShaderProgram;
use crate::resources::ColorGradingSettings;
use crate::signals::SignalSnapshot;

fn grade_program() -> ShaderProgram {
    ShaderProgram::new("color_grading", "color_grading")
        .input("scene")
        .param("exposure", 0.0)
        .param("contrast", 1.0)
        .param("saturation", 1.0)
        .param("lift", Vec3::ZERO)
        .param("gamma", Vec3::ONE)
        .param("gain", Vec3::ONE)
        .param("vignette", 0.0)
        .param("vignette_radius", 0.6)
        .param("warmth", 0.0)
}

struct GradeSlots {
    exposure: ParamSlot,
    contrast: ParamSlot,
    saturation: ParamSlot,
    lift: ParamSlot,
    gamma: ParamSlot,
    gain: ParamSlot,
    vignette: ParamSlot,
    vignette_radius: ParamSlot,
    warmth: ParamSlot,
}

impl GradeSlots {
    fn resolve(p: &Pipeline) -> Result<Self> {
        Ok(Self {
            exposure: p.slot("grade", "exposure")?,
            contrast: p.slot("grade", "contrast")?,
            saturation: p.slot("grade", "saturation")?,
            lift: p.slot("grade", "lift")?,
            gamma: p.slot("grade", "gamma")?,
            gain: p.slot("grade", "gain")?,
            vignette: p.slot("grade", "vignette")?,
            vignette_radius: p.slot("grade", "vignette_radius")?,
            warmth: p.slot("grade", "warmth")?,
        })
    }
}

/// Color grading effect.
pub struct ColorGrading {
    id: String,
    settings: ColorGradingSettings,
    signals: SignalSnapshot,
    slots: Option<GradeSlots>,
}

impl Default for ColorGrading {
    fn default() -> Self {
        Self::new(ColorGradingSettings::default())
    }
}

impl ColorGrading {
    #[must_use]
    pub fn new(settings: ColorGradingSettings) -> Self {
        Self {
            id: "color_grading".to_string(),
            settings: settings.clamped(),
            signals: SignalSnapshot::default(),
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
    pub fn settings(&self) -> &ColorGradingSettings {
        &self.settings
    }

    #[inline]
    pub fn settings_mut(&mut self) -> &mut ColorGradingSettings {
        &mut self.settings
    }
}

impl Effect for ColorGrading {
    fn id(&self) -> &str {
        &self.id
    }

    fn build(&mut self, ctx: &mut BuildContext<'_>) -> Result<Pipeline> {
        let mut b = PipelineBuilder::new(self.id.clone(), ctx);
        b.add_pass(
            PassDesc::new("grade", grade_program())
                .input("scene", InputSource::PipelineInput)
                .to_final(),
        )?;

        let pipeline = b.build()?;
        let (pipeline, slots) = resolve_slots(ctx, pipeline, GradeSlots::resolve)?;
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
        pipeline.set(slots.exposure, s.exposure_for(&self.signals));
        pipeline.set(slots.contrast, s.contrast());
        pipeline.set(slots.saturation, s.saturation());
        pipeline.set(slots.lift, s.lift());
        pipeline.set(slots.gamma, s.gamma());
        pipeline.set(slots.gain, s.gain());
        pipeline.set(slots.vignette, s.vignette());
        pipeline.set(slots.vignette_radius, s.vignette_radius());
        pipeline.set(slots.warmth, s.warmth_for(&self.signals));
    }
}
