//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`HaloError`] follows the pipeline's failure taxonomy:
//! - Resource exhaustion while allocating render targets
//! - Subscriber faults raised by effect callbacks during a broadcast
//! - Misconfigured pipelines rejected at construction time
//! - Stale render target handles (a backstop; rebuild-before-execute keeps
//!   this from firing in a correct frame)
//! - Backend failures (shader compilation, draw submission)
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, HaloError>`.

use thiserror::Error;

use crate::renderer::graph::target_pool::TargetFormat;

/// The main error type for the post-processing pipeline.
#[derive(Error, Debug)]
pub enum HaloError {
    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// A render target could not be allocated (budget exceeded or the
    /// backend ran out of memory). Fatal to the requesting pipeline only.
    #[error("Render target allocation failed for '{label}' ({width}x{height} {format:?}): {reason}")]
    TargetAllocation {
        /// Debug label of the requested target
        label: String,
        /// Requested width in pixels
        width: u32,
        /// Requested height in pixels
        height: u32,
        /// Requested pixel format
        format: TargetFormat,
        /// Why the allocation was refused
        reason: String,
    },

    /// A render target handle outlived the viewport it was sized for.
    #[error("Stale render target '{0}' used after viewport invalidation")]
    StaleTarget(String),

    // ========================================================================
    // Construction Errors
    // ========================================================================
    /// The pipeline description does not match the declared shader programs.
    #[error("Pipeline '{pipeline}' misconfigured: {reason}")]
    Misconfigured {
        /// Label of the pipeline being built
        pipeline: String,
        /// Human-readable description of the problem
        reason: String,
    },

    /// Two different programs were registered under the same name.
    #[error("Shader program '{0}' registered twice with different declarations")]
    ProgramConflict(String),

    /// A draw referenced a program the backend never prepared.
    #[error("Unknown shader program: {0}")]
    UnknownProgram(String),

    // ========================================================================
    // Runtime Errors
    // ========================================================================
    /// The render backend failed to compile or execute work.
    #[error("Render backend error: {0}")]
    Backend(String),

    /// An effect callback failed while handling a signal broadcast.
    #[error("Effect '{effect}' failed while handling signals: {reason}")]
    SubscriberFault {
        /// Identifier of the failing subscription
        effect: String,
        /// Error message or panic payload
        reason: String,
    },
}

impl HaloError {
    /// Returns `true` for resource exhaustion, the error class that disables
    /// one effect for the rest of the session.
    #[inline]
    #[must_use]
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::TargetAllocation { .. })
    }

    pub(crate) fn misconfigured(pipeline: &str, reason: impl Into<String>) -> Self {
        Self::Misconfigured {
            pipeline: pipeline.to_string(),
            reason: reason.into(),
        }
    }
}

/// Alias for `Result<T, HaloError>`.
pub type Result<T> = std::result::Result<T, HaloError>;
