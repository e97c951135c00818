//! Post-processing renderer.
//!
//! - [`graph`]: target pool, programs, passes, pipelines and the effect
//!   pipelines built from them
//! - [`backend`]: lowering of passes to draws (GPU and software)
//! - [`effect`]: per-effect lifecycle controller
//! - [`stack`]: ordered chaining of effects into one frame
//! - [`quality`]: device tiers

pub mod backend;
pub mod effect;
pub mod graph;
pub mod quality;
pub mod stack;
