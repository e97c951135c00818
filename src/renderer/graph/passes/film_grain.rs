//! Film Grain
//!
//! A single full-screen pass. Chroma noise and dust density are decided by
//! the tier at build time.

use super::resolve_slots;
use crate::errors::Result;
use crate::renderer::effect::Effect;
use crate::renderer::graph::params::ParamSlot;
use crate::renderer::graph::pass::{InputSource, PassDesc};
use crate::renderer::graph::pipeline::{BuildContext, Pipeline, PipelineBuilder};
use crate::renderer::graph::program::ShaderProgram;
use crate::renderer::quality::TierParams;
use crate::resources::FilmGrainSettings;
use crate::signals::SignalSnapshot;

fn grain_program() -> ShaderProgram {
    ShaderProgram::new("film_grain", "film_grain")
        .input("scene")
        .param("time", 0.0)
        .param("intensity", 0.06)
        .param("grain_size", 1.5)
        .param("response", 0.6)
        .param("chroma", 0.0)
        .param("dust_density", 0.0)
}

struct FilmGrainSlots {
    time: ParamSlot,
    intensity: ParamSlot,
    grain_size: ParamSlot,
    response: ParamSlot,
    chroma: ParamSlot,
    dust_density: ParamSlot,
}

/// Film grain effect.
pub struct FilmGrain {
    id: String,
    settings: FilmGrainSettings,
    signals: SignalSnapshot,
    tier: TierParams,
    slots: Option<FilmGrainSlots>,
}

impl Default for FilmGrain {
    fn default() -> Self {
        Self::new(FilmGrainSettings::default())
    }
}

impl FilmGrain {
    #[must_use]
    pub fn new(settings: FilmGrainSettings) -> Self {
        Self {
            id: "film_grain".to_string(),
            settings: settings.clamped(),
            signals: SignalSnapshot::default(),
            tier: TierParams::default(),
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
    pub fn settings(&self) -> &FilmGrainSettings {
        &self.settings
    }

    #[inline]
    pub fn settings_mut(&mut self) -> &mut FilmGrainSettings {
        &mut self.settings
    }
}

impl Effect for FilmGrain {
    fn id(&self) -> &str {
        &self.id
    }

    fn build(&mut self, ctx: &mut BuildContext<'_>) -> Result<Pipeline> {
        self.tier = *ctx.tier;
        let s = self.settings;

        let mut b = PipelineBuilder::new(self.id.clone(), ctx);
        b.add_pass(
            PassDesc::new("grain", grain_program())
                .input("scene", InputSource::PipelineInput)
                .param("intensity", s.intensity())
                .param("grain_size", s.grain_size())
                .param("response", s.response())
                .param("chroma", s.chroma_for(&self.tier))
                .param("dust_density", s.dust_for(&self.tier))
                .to_final(),
        )?;

        let pipeline = b.build()?;
        let (pipeline, slots) = resolve_slots(ctx, pipeline, |p| {
            Ok(FilmGrainSlots {
                time: p.slot("grain", "time")?,
                intensity: p.slot("grain", "intensity")?,
                grain_size: p.slot("grain", "grain_size")?,
                response: p.slot("grain", "response")?,
                chroma: p.slot("grain", "chroma")?,
                dust_density: p.slot("grain", "dust_density")?,
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
        let s = &self.settings;
        pipeline.set(slots.time, self.signals.elapsed);
        pipeline.set(slots.intensity, s.intensity_for(&self.signals));
        pipeline.set(slots.grain_size, s.grain_size());
        pipeline.set(slots.response, s.response());
        pipeline.set(slots.chroma, s.chroma_for(&self.tier));
        pipeline.set(slots.dust_density, s.dust_for(&self.tier));
    }
}
