//! Render Target Pool
//!
//! Allocates off-screen color buffers sized as fractions of the viewport and
//! owns their GPU memory lifetime. Pipelines acquire targets while they are
//! being built and release them when they are disposed or rebuilt.
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 RenderTargetPool                         │
//! │                                                          │
//! │  slots:   SlotMap<TargetId, PooledTarget>  (generation)  │
//! │  free:    FxHashMap<PoolKey, Vec<TargetId>>              │
//! │  pending: Vec<TargetId>   (destroyed at end_frame)       │
//! │                                                          │
//! │  acquire()/acquire_sized() → RenderTarget  (build)       │
//! │  resolve(RenderTarget)     → TargetId      (execute)     │
//! │  release()/release_owner()                 (teardown)    │
//! │  resize_viewport()         → bumps epoch                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Invalidation
//!
//! A resize bumps the pool epoch. Free targets are scheduled for destruction
//! and every outstanding handle becomes stale: [`RenderTargetPool::resolve`]
//! rejects it, and the owning pipeline must be rebuilt. Many passes bake
//! resolution-derived step sizes into their parameters at build time, so a
//! rebuild is the single source of truth for "pass N runs at resolution R".
//!
//! Destruction is deferred to [`RenderTargetPool::end_frame`], which runs
//! after the frame has been submitted, so no in-flight pass reads a freed
//! target.
//!
//! # Eviction
//!
//! Released targets stay on the free list so a rebuild in the same frame
//! can reuse them. Each `end_frame` ages the free list; a target nobody
//! re-acquires within [`PoolConfig::max_idle_frames`] frames is destroyed.

use std::sync::atomic::{AtomicU32, Ordering};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::errors::{HaloError, Result};
use crate::renderer::backend::{RenderBackend, TargetDesc};

// ─── Public Types ─────────────────────────────────────────────────────────────

slotmap::new_key_type! {
    /// Generational key of a pooled target. A key from a destroyed slot never
    /// resolves to a newer target occupying the same slot.
    pub struct TargetId;
}

/// Pixel format of an off-screen target.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum TargetFormat {
    /// 8-bit normalized RGBA (LDR).
    Rgba8Unorm,
    /// 16-bit float RGBA (HDR). Pyramid stages use this so intermediate
    /// values are never clipped.
    #[default]
    Rgba16Float,
    /// 16-bit float single channel (masks, circle of confusion).
    R16Float,
}

impl TargetFormat {
    /// Bytes per pixel, used for memory accounting.
    #[inline]
    #[must_use]
    pub const fn bytes_per_pixel(self) -> u64 {
        match self {
            Self::Rgba8Unorm => 4,
            Self::Rgba16Float => 8,
            Self::R16Float => 2,
        }
    }
}

/// Sampling filter used when a later pass reads the target.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum FilterMode {
    #[default]
    Linear,
    Nearest,
}

/// Identifies who holds a lease on pooled targets (one per pipeline owner).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct OwnerId(u32);

impl OwnerId {
    /// Allocates a process-unique owner id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to a leased render target.
///
/// Carries the pool epoch it was created in, so a handle that survived a
/// viewport resize is recognised as stale.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RenderTarget {
    id: TargetId,
    epoch: u32,
    width: u32,
    height: u32,
    format: TargetFormat,
    filter: FilterMode,
}

impl RenderTarget {
    #[inline]
    #[must_use]
    pub fn id(&self) -> TargetId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> TargetFormat {
        self.format
    }

    #[inline]
    #[must_use]
    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    #[inline]
    #[must_use]
    pub fn epoch(&self) -> u32 {
        self.epoch
    }
}

/// Pool configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on the bytes of all targets alive at once.
    /// `None` leaves the limit to the backend.
    pub memory_budget_bytes: Option<u64>,
    /// Free targets nobody re-acquires within this many frames are destroyed
    /// at [`RenderTargetPool::end_frame`].
    pub max_idle_frames: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            memory_budget_bytes: None,
            max_idle_frames: 2,
        }
    }
}

// ─── Internal Types ───────────────────────────────────────────────────────────

/// Free-list key. Filtering is part of the key because backends bake the
/// sampler choice into the target.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct PoolKey {
    width: u32,
    height: u32,
    format: TargetFormat,
    filter: FilterMode,
}

impl PoolKey {
    fn bytes(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * self.format.bytes_per_pixel()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SlotState {
    Leased(OwnerId),
    Free,
    PendingDestroy,
}

struct PooledTarget {
    key: PoolKey,
    label: String,
    epoch: u32,
    state: SlotState,
    /// `end_frame` calls since the target was last released.
    idle_frames: u32,
}

// ─── Pool Implementation ──────────────────────────────────────────────────────

/// Shared pool of off-screen render targets.
///
/// The pool is the only mutable resource shared between effects. Each
/// pipeline owns the targets it acquired exclusively; no two owners ever
/// hold the same target.
pub struct RenderTargetPool {
    config: PoolConfig,
    viewport: (u32, u32),
    epoch: u32,
    slots: SlotMap<TargetId, PooledTarget>,
    free: FxHashMap<PoolKey, Vec<TargetId>>,
    pending_destroy: Vec<TargetId>,
    allocated_bytes: u64,
}

impl RenderTargetPool {
    /// Creates an empty pool for a viewport of `width × height` pixels.
    #[must_use]
    pub fn new(config: PoolConfig, width: u32, height: u32) -> Self {
        Self {
            config,
            viewport: (width.max(1), height.max(1)),
            epoch: 0,
            slots: SlotMap::with_key(),
            free: FxHashMap::default(),
            pending_destroy: Vec::new(),
            allocated_bytes: 0,
        }
    }

    // ── Sizing ─────────────────────────────────────────────────────────────

    /// Resolves a viewport fraction to pixels: `round(extent * fraction)`,
    /// never below 1.
    #[must_use]
    pub fn fraction_to_pixels(extent: u32, fraction: f32) -> u32 {
        if !fraction.is_finite() || fraction <= 0.0 {
            return 1;
        }
        ((extent as f32 * fraction).round() as u32).max(1)
    }

    // ── Build phase ────────────────────────────────────────────────────────

    /// Acquire a target sized as a fraction of the viewport.
    pub fn acquire(
        &mut self,
        backend: &mut dyn RenderBackend,
        owner: OwnerId,
        width_fraction: f32,
        height_fraction: f32,
        format: TargetFormat,
        filter: FilterMode,
        label: &str,
    ) -> Result<RenderTarget> {
        let width = Self::fraction_to_pixels(self.viewport.0, width_fraction);
        let height = Self::fraction_to_pixels(self.viewport.1, height_fraction);
        self.acquire_sized(backend, owner, width, height, format, filter, label)
    }

    /// Acquire a target with an explicit pixel size (clamped to at least 1×1).
    ///
    /// A free target with the same `(width, height, format, filter)` is
    /// reused without touching the backend; otherwise a new one is created.
    pub fn acquire_sized(
        &mut self,
        backend: &mut dyn RenderBackend,
        owner: OwnerId,
        width: u32,
        height: u32,
        format: TargetFormat,
        filter: FilterMode,
        label: &str,
    ) -> Result<RenderTarget> {
        let key = PoolKey {
            width: width.max(1),
            height: height.max(1),
            format,
            filter,
        };

        if let Some(id) = self.free.get_mut(&key).and_then(Vec::pop) {
            if let Some(slot) = self.slots.get_mut(id) {
                slot.state = SlotState::Leased(owner);
                slot.idle_frames = 0;
                slot.label = label.to_string();
                return Ok(self.handle(id, key));
            }
        }

        let bytes = key.bytes();
        if let Some(budget) = self.config.memory_budget_bytes
            && self.allocated_bytes + bytes > budget
        {
            return Err(HaloError::TargetAllocation {
                label: label.to_string(),
                width: key.width,
                height: key.height,
                format,
                reason: format!(
                    "memory budget exceeded ({} + {bytes} > {budget} bytes)",
                    self.allocated_bytes
                ),
            });
        }

        let id = self.slots.insert(PooledTarget {
            key,
            label: label.to_string(),
            epoch: self.epoch,
            state: SlotState::Leased(owner),
            idle_frames: 0,
        });

        let desc = TargetDesc {
            label,
            width: key.width,
            height: key.height,
            format,
            filter,
        };
        if let Err(err) = backend.create_target(id, &desc) {
            self.slots.remove(id);
            return Err(HaloError::TargetAllocation {
                label: label.to_string(),
                width: key.width,
                height: key.height,
                format,
                reason: err.to_string(),
            });
        }

        self.allocated_bytes += bytes;
        log::debug!(
            "Render target '{label}' allocated: {}x{} {format:?} ({} bytes live)",
            key.width,
            key.height,
            self.allocated_bytes
        );

        Ok(self.handle(id, key))
    }

    fn handle(&self, id: TargetId, key: PoolKey) -> RenderTarget {
        RenderTarget {
            id,
            epoch: self.epoch,
            width: key.width,
            height: key.height,
            format: key.format,
            filter: key.filter,
        }
    }

    // ── Execute phase ──────────────────────────────────────────────────────

    /// Maps a handle to its backend id, rejecting handles from an earlier
    /// viewport epoch or from a released slot.
    pub fn resolve(&self, target: &RenderTarget) -> Result<TargetId> {
        match self.slots.get(target.id) {
            Some(slot)
                if target.epoch == self.epoch
                    && slot.epoch == self.epoch
                    && matches!(slot.state, SlotState::Leased(_)) =>
            {
                Ok(target.id)
            }
            Some(slot) => Err(HaloError::StaleTarget(slot.label.clone())),
            None => Err(HaloError::StaleTarget(format!("{:?}", target.id))),
        }
    }

    // ── Teardown ───────────────────────────────────────────────────────────

    /// Returns a target to the pool.
    ///
    /// Targets from the current epoch go to the free list; targets from an
    /// earlier epoch are destroyed at the end of the frame.
    pub fn release(&mut self, target: &RenderTarget) {
        let current_epoch = self.epoch;
        let Some(slot) = self.slots.get_mut(target.id) else {
            log::warn!("Release of unknown render target {:?}", target.id);
            return;
        };

        match slot.state {
            SlotState::Leased(_) if slot.epoch == current_epoch => {
                slot.state = SlotState::Free;
                slot.idle_frames = 0;
                self.free.entry(slot.key).or_default().push(target.id);
            }
            SlotState::Leased(_) => {
                slot.state = SlotState::PendingDestroy;
                self.pending_destroy.push(target.id);
            }
            SlotState::Free | SlotState::PendingDestroy => {
                log::warn!("Render target '{}' released twice", slot.label);
            }
        }
    }

    /// Releases every target leased by `owner`.
    pub fn release_owner(&mut self, owner: OwnerId) {
        let leased: Vec<RenderTarget> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.state == SlotState::Leased(owner))
            .map(|(id, slot)| RenderTarget {
                id,
                epoch: slot.epoch,
                width: slot.key.width,
                height: slot.key.height,
                format: slot.key.format,
                filter: slot.key.filter,
            })
            .collect();

        for target in &leased {
            self.release(target);
        }
    }

    /// Changes the viewport and invalidates every outstanding target.
    ///
    /// Returns `false` (and changes nothing) when the size is unchanged.
    pub fn resize_viewport(&mut self, width: u32, height: u32) -> bool {
        let size = (width.max(1), height.max(1));
        if size == self.viewport {
            return false;
        }

        self.viewport = size;
        self.epoch = self.epoch.wrapping_add(1);

        for (_, ids) in self.free.drain() {
            for id in ids {
                if let Some(slot) = self.slots.get_mut(id) {
                    slot.state = SlotState::PendingDestroy;
                }
                self.pending_destroy.push(id);
            }
        }

        log::debug!(
            "Viewport resized to {}x{} (epoch {}); {} targets scheduled for destruction",
            size.0,
            size.1,
            self.epoch,
            self.pending_destroy.len()
        );
        true
    }

    /// Frees the memory of targets invalidated during this frame, then ages
    /// the free list and destroys targets idle for more than
    /// [`PoolConfig::max_idle_frames`] frames.
    ///
    /// Call after the frame's work has been submitted.
    pub fn end_frame(&mut self, backend: &mut dyn RenderBackend) {
        for id in std::mem::take(&mut self.pending_destroy) {
            self.destroy_slot(backend, id);
        }

        let max_idle = self.config.max_idle_frames;
        let mut expired = Vec::new();
        for ids in self.free.values_mut() {
            ids.retain(|&id| {
                let Some(slot) = self.slots.get_mut(id) else {
                    return false;
                };
                slot.idle_frames += 1;
                if slot.idle_frames > max_idle {
                    expired.push(id);
                    false
                } else {
                    true
                }
            });
        }
        self.free.retain(|_, ids| !ids.is_empty());

        if !expired.is_empty() {
            log::debug!("Evicting {} idle render targets", expired.len());
        }
        for id in expired {
            self.destroy_slot(backend, id);
        }
    }

    /// Destroys every free target immediately.
    pub fn trim(&mut self, backend: &mut dyn RenderBackend) {
        let ids: Vec<TargetId> = self.free.drain().flat_map(|(_, ids)| ids).collect();
        for id in ids {
            self.destroy_slot(backend, id);
        }
    }

    fn destroy_slot(&mut self, backend: &mut dyn RenderBackend, id: TargetId) {
        if let Some(slot) = self.slots.remove(id) {
            self.allocated_bytes = self.allocated_bytes.saturating_sub(slot.key.bytes());
            backend.destroy_target(id);
        }
    }

    /// Frees all GPU memory owned by the pool.
    pub fn dispose(&mut self, backend: &mut dyn RenderBackend) {
        let leased = self.live_count();
        if leased > 0 {
            log::warn!("Disposing render target pool with {leased} targets still leased");
        }

        for (id, _) in self.slots.drain() {
            backend.destroy_target(id);
        }
        self.free.clear();
        self.pending_destroy.clear();
        self.allocated_bytes = 0;
    }

    // ── Queries ────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    #[inline]
    #[must_use]
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of targets currently leased by `owner`.
    #[must_use]
    pub fn outstanding_for(&self, owner: OwnerId) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.state == SlotState::Leased(owner))
            .count()
    }

    /// Number of leased targets across all owners.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot.state, SlotState::Leased(_)))
            .count()
    }

    /// Number of targets sitting in the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    /// Bytes of all targets the backend currently holds for this pool.
    #[inline]
    #[must_use]
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_rounds_and_clamps() {
        assert_eq!(RenderTargetPool::fraction_to_pixels(1920, 0.5), 960);
        assert_eq!(RenderTargetPool::fraction_to_pixels(1081, 0.5), 541);
        assert_eq!(RenderTargetPool::fraction_to_pixels(3, 0.01), 1);
        assert_eq!(RenderTargetPool::fraction_to_pixels(100, 0.0), 1);
        assert_eq!(RenderTargetPool::fraction_to_pixels(100, f32::NAN), 1);
    }

    #[test]
    fn pool_key_bytes_follow_format() {
        let key = PoolKey {
            width: 4,
            height: 2,
            format: TargetFormat::Rgba16Float,
            filter: FilterMode::Linear,
        };
        assert_eq!(key.bytes(), 64);
    }

    #[test]
    fn owner_ids_are_unique() {
        assert_ne!(OwnerId::next(), OwnerId::next());
    }
}
