//! Bloom Pyramid
//!
//! Threshold-based bloom over a halving pyramid.
//!
//! # Algorithm
//!
//! 1. **Threshold**: pixels brighter than the (bass-lowered) threshold are
//!    copied into an HDR target at full viewport resolution; everything
//!    else is black. The pyramid geometry is the same on every tier.
//!
//! 2. **Downsample**: `levels` box-filtered passes, each into a new target of
//!    half the previous size: stage `k` is
//!    `max(1, floor(W / 2^k)) × max(1, floor(H / 2^k))`.
//!
//! 3. **Upsample**: from the coarsest level back up. Each pass writes a new
//!    target at the next finer size:
//!    `up_k = down_k + sample(up_{k+1}) * spread`.
//!    Reading and writing never share a target, so there is no in-place
//!    accumulation.
//!
//! 4. **Composite**: `saturate(scene + up_0 * intensity)`. This is the only
//!    place values are clipped.
//!
//! # Pass Layout (6 levels)
//!
//! ```text
//!  scene ─► threshold ─► down1 ─► … ─► down6
//!              │          │              │
//!              ▼          ▼              ▼
//!             up0 ◄────  up1 ◄── … ◄── up5
//!              │
//!  scene ─► composite ─► final
//! ```
//!
//! 14 passes and 13 owned targets in total.

use glam::Vec2;
use smallvec::SmallVec;

use super::{resolve_slots, texel_size};
use crate::errors::Result;
use crate::renderer::effect::Effect;
use crate::renderer::graph::params::ParamSlot;
use crate::renderer::graph::pass::{InputSource, PassDesc};
use crate::renderer::graph::pipeline::{BuildContext, Pipeline, PipelineBuilder};
use crate::renderer::graph::program::ShaderProgram;
use crate::renderer::graph::target_pool::TargetFormat;
use crate::resources::BloomSettings;
use crate::signals::SignalSnapshot;

const MAX_LEVELS: u32 = 12;

/// Sizes of the pyramid stages `0..=levels` for a `width × height` base.
///
/// Stage `k` is `max(1, floor(width / 2^k)) × max(1, floor(height / 2^k))`.
#[must_use]
pub fn pyramid_sizes(width: u32, height: u32, levels: u32) -> Vec<(u32, u32)> {
    (0..=levels.min(31))
        .map(|k| ((width >> k).max(1), (height >> k).max(1)))
        .collect()
}

fn threshold_program() -> ShaderProgram {
    ShaderProgram::new("bloom_threshold", "bloom_threshold")
        .input("scene")
        .param("threshold", 0.85)
}

fn downsample_program() -> ShaderProgram {
    ShaderProgram::new("bloom_downsample", "bloom_downsample")
        .input("source")
        .param("texel_size", Vec2::ZERO)
}

fn upsample_program() -> ShaderProgram {
    ShaderProgram::new("bloom_upsample", "bloom_upsample")
        .input("base")
        .input("coarse")
        .param("spread", 1.0)
        .param("texel_size", Vec2::ZERO)
}

fn composite_program() -> ShaderProgram {
    ShaderProgram::new("bloom_composite", "bloom_composite")
        .input("scene")
        .input("bloom")
        .param("intensity", 1.0)
}

struct BloomSlots {
    threshold: ParamSlot,
    spreads: SmallVec<[ParamSlot; 8]>,
    intensity: ParamSlot,
}

impl BloomSlots {
    fn resolve(pipeline: &Pipeline, levels: u32) -> Result<Self> {
        let mut spreads = SmallVec::new();
        for k in 0..levels {
            spreads.push(pipeline.slot(&format!("up{k}"), "spread")?);
        }
        Ok(Self {
            threshold: pipeline.slot("threshold", "threshold")?,
            spreads,
            intensity: pipeline.slot("composite", "intensity")?,
        })
    }
}

/// Bloom effect.
pub struct Bloom {
    id: String,
    settings: BloomSettings,
    signals: SignalSnapshot,
    slots: Option<BloomSlots>,
}

impl Default for Bloom {
    fn default() -> Self {
        Self::new(BloomSettings::default())
    }
}

impl Bloom {
    #[must_use]
    pub fn new(settings: BloomSettings) -> Self {
        Self {
            id: "bloom".to_string(),
            settings: settings.clamped(),
            signals: SignalSnapshot::default(),
            slots: None,
        }
    }

    /// Overrides the effect id (and hub subscription id).
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &BloomSettings {
        &self.settings
    }

    #[inline]
    pub fn settings_mut(&mut self) -> &mut BloomSettings {
        &mut self.settings
    }

    /// The snapshot the animated values were last derived from.
    #[inline]
    #[must_use]
    pub fn last_signals(&self) -> &SignalSnapshot {
        &self.signals
    }
}

impl Effect for Bloom {
    fn id(&self) -> &str {
        &self.id
    }

    fn build(&mut self, ctx: &mut BuildContext<'_>) -> Result<Pipeline> {
        let tier = *ctx.tier;
        let (vw, vh) = ctx.viewport();
        let levels = tier.bloom.levels.min(MAX_LEVELS);
        let sizes = pyramid_sizes(vw, vh, levels);

        let mut b = PipelineBuilder::new(self.id.clone(), ctx);

        // ── Threshold ──
        let base = b.target_sized("bloom.threshold", sizes[0].0, sizes[0].1, TargetFormat::Rgba16Float)?;
        let threshold = b.add_pass(
            PassDesc::new("threshold", threshold_program())
                .input("scene", InputSource::PipelineInput)
                .param("threshold", self.settings.threshold())
                .target(base),
        )?;

        // ── Downsample chain ──
        let mut down = Vec::with_capacity(levels as usize + 1);
        down.push(threshold);
        for k in 1..=levels as usize {
            let (w, h) = sizes[k];
            let target = b.target_sized(&format!("bloom.down{k}"), w, h, TargetFormat::Rgba16Float)?;
            let pass = b.add_pass(
                PassDesc::new(format!("down{k}"), downsample_program())
                    .input("source", InputSource::Pass(down[k - 1]))
                    .param("texel_size", texel_size(sizes[k - 1]))
                    .target(target),
            )?;
            down.push(pass);
        }

        // ── Upsample chain ──
        let mut coarse = down[levels as usize];
        for k in (0..levels as usize).rev() {
            let (w, h) = sizes[k];
            let target = b.target_sized(&format!("bloom.up{k}"), w, h, TargetFormat::Rgba16Float)?;
            coarse = b.add_pass(
                PassDesc::new(format!("up{k}"), upsample_program())
                    .input("base", InputSource::Pass(down[k]))
                    .input("coarse", InputSource::Pass(coarse))
                    .param("spread", self.settings.radius())
                    .param("texel_size", texel_size(sizes[k + 1]))
                    .target(target),
            )?;
        }

        // ── Composite ──
        b.add_pass(
            PassDesc::new("composite", composite_program())
                .input("scene", InputSource::PipelineInput)
                .input("bloom", InputSource::Pass(coarse))
                .param("intensity", self.settings.strength())
                .to_final(),
        )?;

        let pipeline = b.build()?;
        let (pipeline, slots) = resolve_slots(ctx, pipeline, |p| BloomSlots::resolve(p, levels))?;
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
        let spread = self.settings.spread_for(&self.signals);
        pipeline.set(slots.threshold, self.settings.threshold_for(&self.signals));
        for &slot in &slots.spreads {
            pipeline.set(slot, spread);
        }
        pipeline.set(slots.intensity, self.settings.intensity_for(&self.signals));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_viewports_clamp_every_stage() {
        let sizes = pyramid_sizes(5, 3, 6);
        assert_eq!(sizes.len(), 7);
        assert_eq!(sizes[1], (2, 1));
        assert!(sizes.iter().skip(3).all(|&s| s == (1, 1)));
    }

    #[test]
    fn program_declarations_are_stable() {
        assert_eq!(upsample_program(), upsample_program());
        assert_eq!(upsample_program().inputs(), &["base", "coarse"]);
    }
}
