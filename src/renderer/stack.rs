//! Effect Stack
//!
//! Chains effect pipelines in a fixed order and owns everything they share:
//! the render target pool, the program registry, the active quality tier and
//! a handle to the [`SignalHub`].
//!
//! # Frame Flow
//!
//! ```text
//! render_frame(color, depth, t)
//!   │
//!   ├─ hub.tick(t) ─► every controller's on_signals
//!   │
//!   ├─ effect 0: color      ─► ping
//!   ├─ effect 1: ping       ─► pong
//!   ├─ …
//!   ├─ effect N: ping|pong  ─► Present
//!   │     (if nothing wrote Present: blit the last good image)
//!   │
//!   ├─ backend.submit()
//!   └─ pool.end_frame()   (deferred destruction)
//! ```
//!
//! Disabled, failed or depth-starved effects are skipped; the next effect
//! reads whatever the last successful one produced, so a broken effect never
//! blanks the frame.

use std::any::Any;
use std::sync::Arc;

use parking_lot::{MappedMutexGuard, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::errors::{HaloError, Result};
use crate::renderer::backend::{DrawTarget, RenderBackend, TextureRef};
use crate::renderer::effect::{Effect, EffectController, EffectStatus};
use crate::renderer::graph::pass::{FrameIo, InputSource, PassDesc};
use crate::renderer::graph::passes::blit_program;
use crate::renderer::graph::pipeline::{BuildContext, Pipeline, PipelineBuilder};
use crate::renderer::graph::program::ProgramRegistry;
use crate::renderer::graph::target_pool::{
    FilterMode, OwnerId, PoolConfig, RenderTarget, RenderTargetPool, TargetFormat, TargetId,
};
use crate::renderer::quality::{QualityTier, TierParams, TierThresholds, select_tier_with};
use crate::signals::{SignalHub, SignalSnapshot};

/// Stack configuration, loadable from the host's config document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub pool: PoolConfig,
    pub thresholds: TierThresholds,
    /// Re-select the tier from the viewport width on every resize.
    pub auto_tier: bool,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            thresholds: TierThresholds::default(),
            auto_tier: true,
        }
    }
}

type DynController = EffectController<Box<dyn Effect>>;

/// Ordered post-processing effects sharing one pool.
pub struct EffectStack {
    config: StackConfig,
    hub: SignalHub,
    pool: RenderTargetPool,
    registry: ProgramRegistry,
    tier: TierParams,
    effects: Vec<DynController>,
    /// Lease owner of the ping-pong targets and the passthrough pipeline.
    owner: OwnerId,
    ping_pong: Option<[RenderTarget; 2]>,
    /// Pool epoch in which a failed chaining acquire was last reported.
    chain_warned_epoch: Option<u32>,
    passthrough: Option<Pipeline>,
    disposed: bool,
}

impl EffectStack {
    /// Creates an empty stack for a `width × height` viewport.
    #[must_use]
    pub fn new(config: StackConfig, hub: &SignalHub, width: u32, height: u32) -> Self {
        let tier = if config.auto_tier {
            select_tier_with(width, &config.thresholds)
        } else {
            TierParams::default()
        };
        log::info!("Effect stack created at {width}x{height} ({:?} tier)", tier.tier);

        Self {
            pool: RenderTargetPool::new(config.pool.clone(), width, height),
            config,
            hub: hub.clone(),
            registry: ProgramRegistry::new(),
            tier,
            effects: Vec::new(),
            owner: OwnerId::next(),
            ping_pong: None,
            chain_warned_epoch: None,
            passthrough: None,
            disposed: false,
        }
    }

    // ── Effects ────────────────────────────────────────────────────────────

    /// Appends an effect. Effects run in push order.
    ///
    /// Fails if an effect with the same id is already on the stack.
    pub fn push_effect<E: Effect>(&mut self, effect: E) -> Result<()> {
        if self.effects.iter().any(|c| c.id() == effect.id()) {
            return Err(HaloError::misconfigured(
                "effect stack",
                format!("effect '{}' is already on the stack", effect.id()),
            ));
        }
        let boxed: Box<dyn Effect> = Box::new(effect);
        self.effects.push(EffectController::new(boxed, &self.hub));
        Ok(())
    }

    /// Disposes and removes an effect. Returns `false` if it was not found.
    pub fn remove_effect(&mut self, id: &str) -> bool {
        let Some(index) = self.effects.iter().position(|c| c.id() == id) else {
            return false;
        };
        let mut controller = self.effects.remove(index);
        controller.dispose(&mut self.pool);
        true
    }

    #[must_use]
    pub fn controller(&self, id: &str) -> Option<&DynController> {
        self.effects.iter().find(|c| c.id() == id)
    }

    pub fn controller_mut(&mut self, id: &str) -> Option<&mut DynController> {
        self.effects.iter_mut().find(|c| c.id() == id)
    }

    /// Locks the effect `id` as its concrete type, for changing settings.
    ///
    /// ```rust,ignore
    /// if let Some(mut bloom) = stack.effect_mut::<Bloom>("bloom") {
    ///     bloom.settings_mut().set_strength(0.9);
    /// }
    /// ```
    pub fn effect_mut<T: Effect>(&self, id: &str) -> Option<MappedMutexGuard<'_, T>> {
        let controller = self.controller(id)?;
        MutexGuard::try_map(controller.state().lock(), |state| {
            let effect: &mut dyn Any = &mut *state.effect;
            effect.downcast_mut::<T>()
        })
        .ok()
    }

    #[must_use]
    pub fn status(&self, id: &str) -> Option<EffectStatus> {
        self.controller(id).map(|c| c.status().clone())
    }

    /// Host toggle for one effect. Returns `false` if it was not found.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.controller_mut(id) {
            Some(controller) => {
                controller.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn effect_ids(&self) -> Vec<&str> {
        self.effects.iter().map(EffectController::id).collect()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn hub(&self) -> &SignalHub {
        &self.hub
    }

    #[inline]
    #[must_use]
    pub fn pool(&self) -> &RenderTargetPool {
        &self.pool
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ProgramRegistry {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub fn tier(&self) -> &TierParams {
        &self.tier
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn viewport(&self) -> (u32, u32) {
        self.pool.viewport()
    }

    /// Pool owner of the stack's own targets.
    #[inline]
    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    // ── Configuration changes ──────────────────────────────────────────────

    /// Resizes the viewport. Every pipeline rebuilds on its next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        if !self.pool.resize_viewport(width, height) {
            return;
        }
        self.release_ping_pong();
        if let Some(passthrough) = self.passthrough.take() {
            passthrough.release(&mut self.pool);
        }

        if self.config.auto_tier {
            let tier = select_tier_with(width, &self.config.thresholds);
            if tier.tier != self.tier.tier {
                log::info!("Quality tier {:?} -> {:?}", self.tier.tier, tier.tier);
            }
            self.tier = tier;
        }
    }

    /// Pins the tier (disabling automatic selection). Pipelines rebuild on
    /// their next frame if the bundle differs from what they were built with.
    pub fn set_tier(&mut self, tier: TierParams) {
        self.config.auto_tier = false;
        self.tier = tier;
    }

    /// Pins one of the canonical tiers.
    pub fn set_quality_tier(&mut self, tier: QualityTier) {
        self.set_tier(TierParams::for_tier(tier));
    }

    // ── Frame ──────────────────────────────────────────────────────────────

    /// Broadcasts signals, runs every runnable effect and presents.
    ///
    /// `color` is the rendered scene; `depth` the linear scene depth if
    /// available. Effect failures never fail the frame; only a failure to
    /// present at all is returned.
    pub fn render_frame(
        &mut self,
        backend: &mut dyn RenderBackend,
        color: TextureRef,
        depth: Option<TextureRef>,
        wall_clock_seconds: f64,
    ) -> Result<Arc<SignalSnapshot>> {
        if self.disposed {
            return Err(HaloError::Backend("effect stack used after dispose".to_string()));
        }

        let snapshot = self.hub.tick(wall_clock_seconds);
        let viewport = self.pool.viewport();

        let runnable: Vec<usize> = (0..self.effects.len())
            .filter(|&i| self.effects[i].is_runnable())
            .collect();
        let chain = if runnable.len() > 1 {
            self.ensure_ping_pong(backend)
        } else {
            self.release_ping_pong();
            None
        };

        let mut current = color;
        let mut current_slot: Option<usize> = None;
        let mut presented = false;

        for (n, &index) in runnable.iter().enumerate() {
            let is_last = n + 1 == runnable.len();
            let (output, write_slot) = if is_last {
                (DrawTarget::Present, None)
            } else if let Some(ids) = chain {
                let slot = current_slot.map_or(0, |s| 1 - s);
                (DrawTarget::Target(ids[slot]), Some(slot))
            } else {
                log::debug!(
                    "Effect '{}' skipped: no intermediate targets",
                    self.effects[index].id()
                );
                continue;
            };

            let io = FrameIo {
                input: current,
                depth,
                output,
                output_size: viewport,
            };
            let wrote = self.effects[index].render(
                backend,
                &mut self.pool,
                &mut self.registry,
                &self.tier,
                &io,
            );

            if wrote {
                match (write_slot, chain) {
                    (Some(slot), Some(ids)) => {
                        current = TextureRef::Target(ids[slot]);
                        current_slot = Some(slot);
                    }
                    _ => presented = true,
                }
            }
        }

        if !presented {
            self.present_passthrough(backend, current)?;
        }

        backend.submit();
        self.pool.end_frame(backend);
        Ok(snapshot)
    }

    /// Leases the two full-viewport chaining targets, returning their
    /// backend ids. `None` (logged) if the pool cannot provide them.
    fn ensure_ping_pong(
        &mut self,
        backend: &mut dyn RenderBackend,
    ) -> Option<[TargetId; 2]> {
        if self.ping_pong.is_none() {
            let mut acquired = Vec::with_capacity(2);
            for label in ["stack.ping", "stack.pong"] {
                match self.pool.acquire(
                    backend,
                    self.owner,
                    1.0,
                    1.0,
                    TargetFormat::Rgba16Float,
                    FilterMode::Linear,
                    label,
                ) {
                    Ok(target) => acquired.push(target),
                    Err(err) => {
                        let epoch = self.pool.epoch();
                        if self.chain_warned_epoch != Some(epoch) {
                            log::warn!("Effect chaining unavailable: {err}");
                            self.chain_warned_epoch = Some(epoch);
                        } else {
                            log::debug!("Effect chaining still unavailable: {err}");
                        }
                        for target in &acquired {
                            self.pool.release(target);
                        }
                        return None;
                    }
                }
            }
            self.ping_pong = Some([acquired[0], acquired[1]]);
        }

        let [ping, pong] = self.ping_pong?;
        match (self.pool.resolve(&ping), self.pool.resolve(&pong)) {
            (Ok(a), Ok(b)) => Some([a, b]),
            _ => None,
        }
    }

    /// Returns the chaining targets to the pool's free list.
    fn release_ping_pong(&mut self) {
        if let Some(targets) = self.ping_pong.take() {
            for target in &targets {
                self.pool.release(target);
            }
        }
    }

    fn present_passthrough(
        &mut self,
        backend: &mut dyn RenderBackend,
        source: TextureRef,
    ) -> Result<()> {
        let stale = self
            .passthrough
            .as_ref()
            .is_none_or(|p| p.epoch() != self.pool.epoch());
        if stale {
            if let Some(old) = self.passthrough.take() {
                old.release(&mut self.pool);
            }
            let mut ctx = BuildContext {
                pool: &mut self.pool,
                backend: &mut *backend,
                registry: &mut self.registry,
                tier: &self.tier,
                owner: self.owner,
            };
            let mut b = PipelineBuilder::new("passthrough", &mut ctx);
            b.add_pass(
                PassDesc::new("blit", blit_program())
                    .input("source", InputSource::PipelineInput)
                    .to_final(),
            )?;
            self.passthrough = Some(b.build()?);
        }

        let Some(passthrough) = &self.passthrough else {
            return Ok(());
        };
        passthrough.execute(
            backend,
            &self.pool,
            &FrameIo {
                input: source,
                depth: None,
                output: DrawTarget::Present,
                output_size: self.pool.viewport(),
            },
        )
    }

    // ── Teardown ───────────────────────────────────────────────────────────

    /// Disposes every effect and frees all pooled memory.
    pub fn dispose(&mut self, backend: &mut dyn RenderBackend) {
        if self.disposed {
            return;
        }
        for controller in &mut self.effects {
            controller.dispose(&mut self.pool);
        }
        self.effects.clear();
        self.release_ping_pong();
        if let Some(passthrough) = self.passthrough.take() {
            passthrough.release(&mut self.pool);
        }
        self.pool.dispose(backend);
        self.disposed = true;
        log::debug!("Effect stack disposed");
    }
}
