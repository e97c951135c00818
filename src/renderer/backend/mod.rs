//! Render Backends
//!
//! The pipeline scaffolding never talks to a graphics API directly. Every
//! pass is lowered to a [`DrawCommand`] (one full-screen draw: program,
//! parameters in declaration order, input textures, one output) and handed
//! to a [`RenderBackend`].
//!
//! Two implementations ship with the crate:
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | [`GpuBackend`] | [`gpu`] | wgpu device + queue; WGSL templates |
//! | [`CpuBackend`] | [`cpu`] | software reference; tests, headless tooling |
//!
//! Submitted draws execute in submission order on a single command stream.
//! No fences are needed: every target has exactly one producer per frame and
//! no pass reads the target it writes.

pub mod cpu;
pub mod gpu;
pub mod shader_manager;

pub use cpu::CpuBackend;
pub use gpu::GpuBackend;

use crate::errors::Result;
use crate::renderer::graph::params::ParamValue;
use crate::renderer::graph::pass::BlendMode;
use crate::renderer::graph::program::{ProgramId, ShaderProgram};
use crate::renderer::graph::target_pool::{FilterMode, TargetFormat, TargetId};

/// Host-provided texture (scene color, scene depth) registered with a
/// backend. Not owned by the target pool.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ExternalTexture(pub u32);

/// Description of a target the pool asks the backend to create.
#[derive(Clone, Copy, Debug)]
pub struct TargetDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: TargetFormat,
    pub filter: FilterMode,
}

/// A texture bound as a pass input.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TextureRef {
    /// A pooled render target.
    Target(TargetId),
    /// A host-provided texture.
    External(ExternalTexture),
}

/// Where a draw writes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DrawTarget {
    /// A pooled render target.
    Target(TargetId),
    /// The presentation surface (swap-chain image).
    Present,
}

/// One full-screen draw.
#[derive(Debug)]
pub struct DrawCommand<'a> {
    pub label: &'a str,
    pub program: ProgramId,
    /// Parameter values in the program's declaration order.
    pub params: &'a [ParamValue],
    /// Input textures in the program's declaration order.
    pub inputs: &'a [TextureRef],
    pub output: DrawTarget,
    /// Output extent in pixels.
    pub output_size: (u32, u32),
    pub blend: BlendMode,
}

/// Graphics API seam used by the target pool and pipelines.
pub trait RenderBackend {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Compile/validate a program. Called once per program and backend;
    /// repeated calls with the same id must be cheap no-ops.
    fn prepare_program(&mut self, id: ProgramId, program: &ShaderProgram) -> Result<()>;

    /// Allocate storage for a pooled target.
    fn create_target(&mut self, id: TargetId, desc: &TargetDesc<'_>) -> Result<()>;

    /// Free a pooled target. Unknown ids are ignored.
    fn destroy_target(&mut self, id: TargetId);

    /// Record one full-screen draw.
    fn draw(&mut self, cmd: &DrawCommand<'_>) -> Result<()>;

    /// Submit all draws recorded since the previous submit.
    fn submit(&mut self);
}
