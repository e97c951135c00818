//! Effect Controller
//!
//! Owns one effect's pipeline and parameter state for its whole lifetime:
//! subscribes to the [`SignalHub`] on creation, rebuilds the pipeline when
//! the viewport epoch or the quality tier changes, writes per-frame
//! parameters and executes, and tears everything down on dispose.
//!
//! # Lifecycle
//!
//! ```text
//!  new() ── register "id" on hub
//!    │
//!    ▼                 epoch / tier changed?
//!  render() ──► rebuild? ── yes ──► release old targets ──► Effect::build
//!    │                                                           │
//!    ▼ ◄─────────────────────────────────────────────────────────┘
//!  Effect::write_params ──► Pipeline::execute
//!    │
//!    ├─ failure ──► Disabled (targets released, unsubscribed, logged)
//!    ▼
//!  dispose() ── unregister + release every target
//! ```
//!
//! The signal callback and the render path share the effect through an
//! `Arc<Mutex<_>>`: the hub writes animated state between frames, the render
//! path reads it when writing parameters. Both run on the render thread, so
//! the lock is never contended.

use std::any::Any;
use std::sync::Arc;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::errors::{HaloError, Result};
use crate::renderer::backend::RenderBackend;
use crate::renderer::graph::pass::FrameIo;
use crate::renderer::graph::pipeline::{BuildContext, Pipeline};
use crate::renderer::graph::program::ProgramRegistry;
use crate::renderer::graph::target_pool::{OwnerId, RenderTargetPool};
use crate::renderer::quality::TierParams;
use crate::signals::{SignalHub, SignalSnapshot};

/// A post-processing effect: a pipeline recipe plus its animated state.
pub trait Effect: Any + Send {
    /// Unique id; also the effect's hub subscription id.
    fn id(&self) -> &str;

    /// Builds the pipeline for the current viewport and tier. Implementations
    /// resolve and store their [`ParamSlot`](crate::renderer::graph::params::ParamSlot)s here.
    fn build(&mut self, ctx: &mut BuildContext<'_>) -> Result<Pipeline>;

    /// Advances animated state from this frame's signals.
    fn on_signals(&mut self, signals: &SignalSnapshot);

    /// Writes this frame's parameter values into the built pipeline.
    fn write_params(&self, pipeline: &mut Pipeline);
}

impl Effect for Box<dyn Effect> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn build(&mut self, ctx: &mut BuildContext<'_>) -> Result<Pipeline> {
        (**self).build(ctx)
    }

    fn on_signals(&mut self, signals: &SignalSnapshot) {
        (**self).on_signals(signals);
    }

    fn write_params(&self, pipeline: &mut Pipeline) {
        (**self).write_params(pipeline);
    }
}

/// Lifecycle state of a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectStatus {
    Active,
    /// Turned off for the rest of the session after a failure.
    Disabled { reason: String },
    Disposed,
}

pub(crate) struct ControllerState<E> {
    pub(crate) effect: E,
    pub(crate) signal_count: u64,
}

/// Drives one [`Effect`].
pub struct EffectController<E: Effect> {
    id: String,
    owner: OwnerId,
    hub: SignalHub,
    state: Arc<Mutex<ControllerState<E>>>,
    pipeline: Option<Pipeline>,
    built_tier: Option<TierParams>,
    status: EffectStatus,
    enabled: bool,
}

impl<E: Effect> EffectController<E> {
    /// Wraps `effect` and subscribes it to `hub`.
    pub fn new(effect: E, hub: &SignalHub) -> Self {
        let id = effect.id().to_string();
        let state = Arc::new(Mutex::new(ControllerState {
            effect,
            signal_count: 0,
        }));

        let weak = Arc::downgrade(&state);
        hub.register_effect(id.clone(), move |signals: &SignalSnapshot| {
            if let Some(state) = weak.upgrade() {
                let mut state = state.lock();
                state.signal_count += 1;
                state.effect.on_signals(signals);
            }
            Ok(())
        });

        Self {
            id,
            owner: OwnerId::next(),
            hub: hub.clone(),
            state,
            pipeline: None,
            built_tier: None,
            status: EffectStatus::Active,
            enabled: true,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Pool owner id of every target this controller leases.
    #[inline]
    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> &EffectStatus {
        &self.status
    }

    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == EffectStatus::Active
    }

    /// Host toggle. A disabled effect keeps its pipeline but is skipped.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `true` when the effect participates in the next frame.
    #[inline]
    #[must_use]
    pub fn is_runnable(&self) -> bool {
        self.enabled && self.is_active()
    }

    /// The built pipeline, if any.
    #[inline]
    #[must_use]
    pub fn pipeline(&self) -> Option<&Pipeline> {
        self.pipeline.as_ref()
    }

    /// Number of signal broadcasts this effect has received.
    #[must_use]
    pub fn signal_count(&self) -> u64 {
        self.state.lock().signal_count
    }

    /// Locks the effect for reading or changing its settings.
    pub fn effect(&self) -> MappedMutexGuard<'_, E> {
        MutexGuard::map(self.state.lock(), |s| &mut s.effect)
    }

    pub(crate) fn state(&self) -> &Arc<Mutex<ControllerState<E>>> {
        &self.state
    }

    /// Builds (or rebuilds) the pipeline if the viewport epoch or the tier
    /// changed since the last build.
    pub fn prepare(
        &mut self,
        backend: &mut dyn RenderBackend,
        pool: &mut RenderTargetPool,
        registry: &mut ProgramRegistry,
        tier: &TierParams,
    ) -> Result<()> {
        if !self.is_active() {
            return Err(HaloError::Backend(format!("effect '{}' is not active", self.id)));
        }

        let fresh = self.pipeline.as_ref().is_some_and(|p| p.epoch() == pool.epoch())
            && self.built_tier.as_ref() == Some(tier);
        if fresh {
            return Ok(());
        }

        if let Some(old) = self.pipeline.take() {
            old.release(pool);
        }

        let mut ctx = BuildContext {
            pool,
            backend,
            registry,
            tier,
            owner: self.owner,
        };
        let pipeline = self.state.lock().effect.build(&mut ctx)?;

        log::debug!(
            "Effect '{}' built for {}x{} ({:?} tier)",
            self.id,
            ctx.viewport().0,
            ctx.viewport().1,
            tier.tier
        );
        self.pipeline = Some(pipeline);
        self.built_tier = Some(*tier);
        Ok(())
    }

    /// Rebuilds if needed, writes parameters and executes.
    ///
    /// Returns `true` when the effect wrote `io.output`. Any failure disables
    /// the effect for the rest of the session and returns `false`.
    pub fn render(
        &mut self,
        backend: &mut dyn RenderBackend,
        pool: &mut RenderTargetPool,
        registry: &mut ProgramRegistry,
        tier: &TierParams,
        io: &FrameIo,
    ) -> bool {
        if !self.is_runnable() {
            return false;
        }

        let result = self.prepare(backend, pool, registry, tier).and_then(|()| {
            let Some(pipeline) = self.pipeline.as_mut() else {
                return Ok(false);
            };
            if pipeline.uses_depth() && io.depth.is_none() {
                log::debug!("Effect '{}' skipped: no depth this frame", self.id);
                return Ok(false);
            }
            self.state.lock().effect.write_params(pipeline);
            pipeline.execute(backend, pool, io)?;
            Ok(true)
        });

        match result {
            Ok(wrote) => wrote,
            Err(err) => {
                self.disable(pool, &err);
                false
            }
        }
    }

    fn disable(&mut self, pool: &mut RenderTargetPool, err: &HaloError) {
        if err.is_resource_exhaustion() {
            log::warn!("Effect '{}' disabled: {err}", self.id);
        } else {
            log::error!("Effect '{}' disabled: {err}", self.id);
        }

        self.hub.unregister_effect(&self.id);
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.release(pool);
        }
        pool.release_owner(self.owner);
        self.built_tier = None;
        self.status = EffectStatus::Disabled {
            reason: err.to_string(),
        };
    }

    /// Unsubscribes from the hub and returns every target to the pool.
    pub fn dispose(&mut self, pool: &mut RenderTargetPool) {
        if self.status == EffectStatus::Disposed {
            return;
        }
        self.hub.unregister_effect(&self.id);
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.release(pool);
        }
        pool.release_owner(self.owner);
        self.built_tier = None;
        self.status = EffectStatus::Disposed;
        log::debug!("Effect '{}' disposed", self.id);
    }
}

impl<E: Effect> Drop for EffectController<E> {
    fn drop(&mut self) {
        if self.status != EffectStatus::Disposed {
            self.hub.unregister_effect(&self.id);
            if self.pipeline.is_some() {
                log::warn!(
                    "Effect '{}' dropped without dispose; its targets stay leased until the pool is disposed",
                    self.id
                );
            }
        }
    }
}
