//! Pass graph
//!
//! - [`target_pool`]: off-screen targets as viewport fractions
//! - [`program`]: shader program declarations and their registry
//! - [`params`]: typed pass parameters and uniform packing
//! - [`pass`]: one full-screen draw
//! - [`pipeline`]: validated, ordered pass lists
//! - [`passes`]: the effect pipelines

pub mod params;
pub mod pass;
pub mod passes;
pub mod pipeline;
pub mod program;
pub mod target_pool;

pub use params::{ParamKind, ParamSlot, ParamValue};
pub use pass::{BlendMode, FrameIo, InputSource, Pass, PassDesc, PassIndex, PassOutput};
pub use pipeline::{BuildContext, Pipeline, PipelineBuilder};
pub use program::{ProgramId, ProgramRegistry, ShaderProgram};
pub use target_pool::{
    FilterMode, OwnerId, PoolConfig, RenderTarget, RenderTargetPool, TargetFormat, TargetId,
};
