//! Passes
//!
//! A [`Pass`] is one full-screen draw: a program, its parameter values, its
//! input textures and exactly one output. Passes are described with a
//! [`PassDesc`] and validated by the
//! [`PipelineBuilder`](super::pipeline::PipelineBuilder); once built they are
//! structurally immutable and only their parameter values change per frame.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::params::ParamValue;
use super::program::{ProgramId, ShaderProgram};
use super::target_pool::{RenderTarget, RenderTargetPool};
use crate::errors::{HaloError, Result};
use crate::renderer::backend::{DrawCommand, DrawTarget, RenderBackend, TextureRef};

/// Index of a pass inside its pipeline.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PassIndex(pub(crate) usize);

impl PassIndex {
    #[inline]
    #[must_use]
    pub fn get(self) -> usize {
        self.0
    }
}

/// Where a pass input comes from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InputSource {
    /// The color texture handed to the pipeline for this frame.
    PipelineInput,
    /// The scene depth texture for this frame.
    Depth,
    /// The output of an earlier pass of the same pipeline.
    Pass(PassIndex),
}

/// Where a pass writes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PassOutput {
    /// A target owned by the pipeline.
    Target(RenderTarget),
    /// The pipeline's final output, resolved per frame (the next effect's
    /// input, or the presentation surface).
    Final,
}

/// Color blending of a pass output.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Replace,
    /// `dst + src`, used for accumulating passes.
    Additive,
}

/// Builder-side description of a pass.
#[derive(Clone, Debug)]
pub struct PassDesc {
    pub(crate) label: String,
    pub(crate) program: ShaderProgram,
    pub(crate) params: Vec<(String, ParamValue)>,
    pub(crate) inputs: Vec<(String, InputSource)>,
    pub(crate) output: Option<PassOutput>,
    pub(crate) blend: BlendMode,
}

impl PassDesc {
    #[must_use]
    pub fn new(label: impl Into<String>, program: ShaderProgram) -> Self {
        Self {
            label: label.into(),
            program,
            params: Vec::new(),
            inputs: Vec::new(),
            output: None,
            blend: BlendMode::Replace,
        }
    }

    /// Binds a declared texture input.
    #[must_use]
    pub fn input(mut self, name: impl Into<String>, source: InputSource) -> Self {
        self.inputs.push((name.into(), source));
        self
    }

    /// Binds a declared parameter. Undeclared names are rejected at build.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn output(mut self, output: PassOutput) -> Self {
        self.output = Some(output);
        self
    }

    #[must_use]
    pub fn target(self, target: RenderTarget) -> Self {
        self.output(PassOutput::Target(target))
    }

    #[must_use]
    pub fn to_final(self) -> Self {
        self.output(PassOutput::Final)
    }

    #[must_use]
    pub fn blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }
}

/// Per-frame external resources of a pipeline execution.
#[derive(Clone, Copy, Debug)]
pub struct FrameIo {
    /// Color input of the first pass.
    pub input: TextureRef,
    /// Scene depth, required by depth-dependent pipelines.
    pub depth: Option<TextureRef>,
    /// Where [`PassOutput::Final`] writes.
    pub output: DrawTarget,
    /// Extent of `output`.
    pub output_size: (u32, u32),
}

/// A validated pass.
#[derive(Debug)]
pub struct Pass {
    pub(crate) label: String,
    pub(crate) program: ProgramId,
    pub(crate) param_names: SmallVec<[&'static str; 8]>,
    pub(crate) params: Vec<ParamValue>,
    pub(crate) inputs: SmallVec<[InputSource; 4]>,
    pub(crate) output: PassOutput,
    pub(crate) blend: BlendMode,
}

impl Pass {
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    #[must_use]
    pub fn program(&self) -> ProgramId {
        self.program
    }

    #[inline]
    #[must_use]
    pub fn output(&self) -> PassOutput {
        self.output
    }

    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &[InputSource] {
        &self.inputs
    }

    #[inline]
    #[must_use]
    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    /// Current value of a parameter, by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<ParamValue> {
        self.param_names
            .iter()
            .position(|n| *n == name)
            .map(|i| self.params[i])
    }

    /// Binds inputs and output, then issues one full-screen draw.
    pub(crate) fn execute(
        &self,
        backend: &mut dyn RenderBackend,
        pool: &RenderTargetPool,
        io: &FrameIo,
        earlier: &[Pass],
    ) -> Result<()> {
        let mut inputs: SmallVec<[TextureRef; 4]> = SmallVec::new();
        for source in &self.inputs {
            let texture = match *source {
                InputSource::PipelineInput => io.input,
                InputSource::Depth => io.depth.ok_or_else(|| {
                    HaloError::misconfigured(&self.label, "pass reads depth but none was provided")
                })?,
                InputSource::Pass(PassIndex(i)) => match earlier.get(i).map(|p| p.output) {
                    Some(PassOutput::Target(target)) => TextureRef::Target(pool.resolve(&target)?),
                    _ => {
                        return Err(HaloError::misconfigured(
                            &self.label,
                            format!("input pass #{i} has no readable output"),
                        ));
                    }
                },
            };
            inputs.push(texture);
        }

        let (output, output_size) = match self.output {
            PassOutput::Target(target) => (DrawTarget::Target(pool.resolve(&target)?), target.size()),
            PassOutput::Final => (io.output, io.output_size),
        };

        backend.draw(&DrawCommand {
            label: &self.label,
            program: self.program,
            params: &self.params,
            inputs: &inputs,
            output,
            output_size,
            blend: self.blend,
        })
    }
}
