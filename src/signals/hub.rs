//! Signal Broadcast Hub
//!
//! Decouples the producers of per-frame motion signals (audio analyzer,
//! scroll tracker, camera and animation controllers) from the many effects
//! that consume them.
//!
//! # Data Flow
//!
//! ```text
//! host setters ──► SignalInputs (clamped)
//!                        │
//!                        ▼  tick(wall_clock)
//!                 Arc<SignalSnapshot>  (one per frame)
//!                        │
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!      "bloom"       "god_rays"     "grain"     (registration order)
//! ```
//!
//! # Fault Isolation
//!
//! A subscriber that returns an error or panics is logged with its effect id
//! and counted; the remaining subscribers still run and the frame continues.
//! One broken effect must not blank the whole visual pipeline.
//!
//! The hub is an owned handle, created by the host at startup and passed to
//! every effect controller; it is not a global.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::snapshot::SignalSnapshot;
use crate::errors::{HaloError, Result};
use crate::utils::time::Timer;

/// Subscriber callback.
pub type SignalCallback = Arc<dyn Fn(&SignalSnapshot) -> Result<()> + Send + Sync>;

/// Hub configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Upper bound of the delta fed into the snapshot. A resumed tab or a
    /// long stall advances animation by at most this much.
    pub max_delta_seconds: f32,
    /// Field of view reported until the camera controller sets one.
    pub default_fov: f32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_delta_seconds: 1.0 / 15.0,
            default_fov: 60.0,
        }
    }
}

/// Latest values pushed by the external collaborators.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SignalInputs {
    scroll_progress: f32,
    bass_level: f32,
    mid_level: f32,
    high_level: f32,
    blessing_wave_progress: f32,
    camera_fov: f32,
}

fn unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

struct Subscription {
    id: String,
    callback: SignalCallback,
}

struct HubInner {
    config: HubConfig,
    inputs: SignalInputs,
    subscriptions: Vec<Subscription>,
    faults: FxHashMap<String, u64>,
    frame: u64,
    last_wall_clock: Option<f64>,
    elapsed: f64,
    latest: Option<Arc<SignalSnapshot>>,
}

/// Publish/subscribe hub for per-frame signals.
///
/// Cloning yields another handle to the same hub.
#[derive(Clone)]
pub struct SignalHub {
    inner: Arc<Mutex<HubInner>>,
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl SignalHub {
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        let fov = config.default_fov;
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                config,
                inputs: SignalInputs {
                    scroll_progress: 0.0,
                    bass_level: 0.0,
                    mid_level: 0.0,
                    high_level: 0.0,
                    blessing_wave_progress: 0.0,
                    camera_fov: fov,
                },
                subscriptions: Vec::new(),
                faults: FxHashMap::default(),
                frame: 0,
                last_wall_clock: None,
                elapsed: 0.0,
                latest: None,
            })),
        }
    }

    #[must_use]
    pub fn config(&self) -> HubConfig {
        self.inner.lock().config
    }

    // ── Subscriptions ──────────────────────────────────────────────────────

    /// Registers `callback` under `id`.
    ///
    /// Registering an id that is already present replaces its callback in
    /// place (keeping its position in the call order). Returns `true` when a
    /// previous registration was replaced.
    pub fn register_effect<F>(&self, id: impl Into<String>, callback: F) -> bool
    where
        F: Fn(&SignalSnapshot) -> Result<()> + Send + Sync + 'static,
    {
        let id = id.into();
        let callback: SignalCallback = Arc::new(callback);
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.subscriptions.iter_mut().find(|s| s.id == id) {
            existing.callback = callback;
            log::debug!("Signal subscription '{id}' replaced");
            return true;
        }

        log::debug!("Signal subscription '{id}' registered");
        inner.subscriptions.push(Subscription { id, callback });
        false
    }

    /// Removes the subscription of `id`. Unknown ids are a no-op.
    ///
    /// Returns `true` when a subscription was removed.
    pub fn unregister_effect(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.id != id);
        let removed = inner.subscriptions.len() != before;
        if removed {
            log::debug!("Signal subscription '{id}' unregistered");
        }
        removed
    }

    #[must_use]
    pub fn is_registered(&self, id: &str) -> bool {
        self.inner.lock().subscriptions.iter().any(|s| s.id == id)
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    /// Subscription ids in call order.
    #[must_use]
    pub fn subscription_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .subscriptions
            .iter()
            .map(|s| s.id.clone())
            .collect()
    }

    /// Number of failed callback invocations recorded for `id`.
    #[must_use]
    pub fn fault_count(&self, id: &str) -> u64 {
        self.inner.lock().faults.get(id).copied().unwrap_or(0)
    }

    /// Drops every subscription. Called by the host at teardown.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        let count = inner.subscriptions.len();
        inner.subscriptions.clear();
        log::debug!("Signal hub shut down ({count} subscriptions dropped)");
    }

    // ── Inputs ─────────────────────────────────────────────────────────────

    pub fn set_scroll_progress(&self, progress: f32) {
        self.inner.lock().inputs.scroll_progress = unit(progress);
    }

    pub fn set_audio_levels(&self, bass: f32, mid: f32, high: f32) {
        let mut inner = self.inner.lock();
        inner.inputs.bass_level = unit(bass);
        inner.inputs.mid_level = unit(mid);
        inner.inputs.high_level = unit(high);
    }

    pub fn set_blessing_wave_progress(&self, progress: f32) {
        self.inner.lock().inputs.blessing_wave_progress = unit(progress);
    }

    /// Sets the camera field of view in degrees (clamped to `[1, 179]`).
    pub fn set_camera_fov(&self, degrees: f32) {
        let mut inner = self.inner.lock();
        inner.inputs.camera_fov = if degrees.is_finite() {
            degrees.clamp(1.0, 179.0)
        } else {
            inner.config.default_fov
        };
    }

    // ── Broadcast ──────────────────────────────────────────────────────────

    /// The snapshot of the most recent tick.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<SignalSnapshot>> {
        self.inner.lock().latest.clone()
    }

    /// Computes this frame's snapshot and invokes every subscriber with it.
    ///
    /// `wall_clock_seconds` is the host's monotonic clock. The frame delta is
    /// clamped to `[0, max_delta_seconds]`.
    pub fn tick(&self, wall_clock_seconds: f64) -> Arc<SignalSnapshot> {
        let (snapshot, subscribers) = {
            let mut inner = self.inner.lock();

            let raw_delta = inner
                .last_wall_clock
                .map_or(0.0, |last| wall_clock_seconds - last);
            let max_delta = f64::from(inner.config.max_delta_seconds.max(0.0));
            let delta = if raw_delta.is_finite() {
                raw_delta.clamp(0.0, max_delta)
            } else {
                0.0
            };
            if raw_delta > max_delta {
                log::debug!("Frame delta {raw_delta:.3}s clamped to {max_delta:.3}s");
            }

            inner.last_wall_clock = Some(wall_clock_seconds);
            inner.elapsed += delta;
            inner.frame += 1;

            let inputs = inner.inputs;
            let snapshot = Arc::new(SignalSnapshot {
                frame: inner.frame,
                wall_clock_time: wall_clock_seconds,
                elapsed: inner.elapsed as f32,
                delta_time: delta as f32,
                scroll_progress: inputs.scroll_progress,
                bass_level: inputs.bass_level,
                mid_level: inputs.mid_level,
                high_level: inputs.high_level,
                blessing_wave_progress: inputs.blessing_wave_progress,
                camera_fov: inputs.camera_fov,
            });
            inner.latest = Some(Arc::clone(&snapshot));

            let subscribers: Vec<(String, SignalCallback)> = inner
                .subscriptions
                .iter()
                .map(|s| (s.id.clone(), Arc::clone(&s.callback)))
                .collect();
            (snapshot, subscribers)
        };

        // Callbacks run outside the lock so they may (un)register. A
        // subscription removed or replaced earlier in this tick is skipped.
        for (id, callback) in subscribers {
            let current = self
                .inner
                .lock()
                .subscriptions
                .iter()
                .any(|s| s.id == id && Arc::ptr_eq(&s.callback, &callback));
            if !current {
                log::trace!("Subscriber '{id}' left during the tick; skipped");
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(&snapshot)));
            let fault = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(payload) => Some(panic_message(payload.as_ref())),
            };

            if let Some(reason) = fault {
                let err = HaloError::SubscriberFault {
                    effect: id.clone(),
                    reason,
                };
                log::error!("{err}");
                *self.inner.lock().faults.entry(id).or_insert(0) += 1;
            }
        }

        snapshot
    }

    /// Advances `timer` and ticks with its elapsed time.
    pub fn tick_timer(&self, timer: &mut Timer) -> Arc<SignalSnapshot> {
        timer.tick();
        self.tick(timer.elapsed_seconds())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
