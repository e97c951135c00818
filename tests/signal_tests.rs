//! Signal Hub Tests
//!
//! Tests for:
//! - Subscription bookkeeping: idempotent registration, no-op unregistration
//! - Changes made by a subscriber during a tick
//! - Broadcast: one shared snapshot per frame, registration order
//! - Frame clock: delta clamping, backwards clocks
//! - Input clamping
//! - Fault isolation: erroring and panicking subscribers

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use halo::signals::{HubConfig, SignalHub, SignalSnapshot};
use halo::utils::Timer;
use halo::HaloError;

const EPSILON: f32 = 1e-5;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn counting(count: Arc<AtomicUsize>) -> impl Fn(&SignalSnapshot) -> halo::Result<()> {
    move |_| {
        count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

#[test]
fn reregistration_replaces_in_place() {
    let hub = SignalHub::default();
    let first = counter();
    let second = counter();

    assert!(!hub.register_effect("bloom", counting(Arc::clone(&first))));
    hub.register_effect("grain", |_| Ok(()));
    assert!(hub.register_effect("bloom", counting(Arc::clone(&second))));

    assert_eq!(hub.subscription_count(), 2);
    assert_eq!(hub.subscription_ids(), vec!["bloom", "grain"]);

    hub.tick(0.0);
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn unregistering_unknown_id_is_noop() {
    let hub = SignalHub::default();
    hub.register_effect("bloom", |_| Ok(()));

    assert!(!hub.unregister_effect("missing"));
    assert_eq!(hub.subscription_count(), 1);

    assert!(hub.unregister_effect("bloom"));
    assert!(!hub.unregister_effect("bloom"));
    assert!(!hub.is_registered("bloom"));
}

#[test]
fn unregistered_effect_receives_nothing() {
    let hub = SignalHub::default();
    let count = counter();
    hub.register_effect("bloom", counting(Arc::clone(&count)));
    hub.tick(0.0);
    hub.unregister_effect("bloom");
    hub.tick(0.016);
    hub.tick(0.032);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn shutdown_drops_every_subscription() {
    let hub = SignalHub::default();
    let count = counter();
    hub.register_effect("a", counting(Arc::clone(&count)));
    hub.register_effect("b", counting(Arc::clone(&count)));
    hub.shutdown();
    hub.tick(0.0);
    assert_eq!(hub.subscription_count(), 0);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn callback_may_unregister_itself() {
    let hub = SignalHub::default();
    let handle = hub.clone();
    hub.register_effect("once", move |_| {
        handle.unregister_effect("once");
        Ok(())
    });

    hub.tick(0.0);
    assert!(!hub.is_registered("once"));
    hub.tick(0.01);
}

#[test]
fn effect_unregistered_mid_tick_is_not_called() {
    let hub = SignalHub::default();
    let handle = hub.clone();
    let later = counter();
    hub.register_effect("a", move |_| {
        handle.unregister_effect("b");
        Ok(())
    });
    hub.register_effect("b", counting(Arc::clone(&later)));

    hub.tick(0.0);
    assert!(!hub.is_registered("b"));
    assert_eq!(later.load(Ordering::SeqCst), 0);
    hub.shutdown();
}

#[test]
fn replacement_registered_mid_tick_waits_for_the_next_tick() {
    let hub = SignalHub::default();
    let handle = hub.clone();
    let old = counter();
    let new = counter();
    let replacement = Arc::clone(&new);
    hub.register_effect("a", move |_| {
        handle.register_effect("b", counting(Arc::clone(&replacement)));
        Ok(())
    });
    hub.register_effect("b", counting(Arc::clone(&old)));

    hub.tick(0.0);
    assert_eq!(old.load(Ordering::SeqCst), 0);
    assert_eq!(new.load(Ordering::SeqCst), 0);

    // `a` would replace `b` again on every tick.
    hub.unregister_effect("a");
    hub.tick(0.016);
    assert_eq!(old.load(Ordering::SeqCst), 0);
    assert_eq!(new.load(Ordering::SeqCst), 1);
    hub.shutdown();
}

// ============================================================================
// Broadcast
// ============================================================================

#[test]
fn every_subscriber_sees_the_same_snapshot() {
    let hub = SignalHub::default();
    let seen: Arc<Mutex<Vec<(usize, u64)>>> = Arc::default();

    for id in ["bloom", "god_rays", "grain"] {
        let seen = Arc::clone(&seen);
        hub.register_effect(id, move |s| {
            seen.lock().push((std::ptr::from_ref(s) as usize, s.frame));
            Ok(())
        });
    }

    let snapshot = hub.tick(1.0);
    let seen = seen.lock();
    assert_eq!(seen.len(), 3);
    for &(address, frame) in seen.iter() {
        assert_eq!(address, Arc::as_ptr(&snapshot) as usize);
        assert_eq!(frame, snapshot.frame);
    }
    assert!(Arc::ptr_eq(&snapshot, &hub.latest().unwrap()));
}

#[test]
fn subscribers_run_in_registration_order() {
    let hub = SignalHub::default();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::default();
    for id in ["c", "a", "b"] {
        let order = Arc::clone(&order);
        hub.register_effect(id, move |_| {
            order.lock().push(id);
            Ok(())
        });
    }
    hub.tick(0.0);
    assert_eq!(*order.lock(), vec!["c", "a", "b"]);
}

#[test]
fn frames_count_from_one() {
    let hub = SignalHub::default();
    assert!(hub.latest().is_none());
    assert_eq!(hub.tick(0.0).frame, 1);
    assert_eq!(hub.tick(0.1).frame, 2);
}

// ============================================================================
// Frame clock
// ============================================================================

#[test]
fn long_stall_is_clamped() {
    let hub = SignalHub::default();
    hub.tick(10.0);
    let snapshot = hub.tick(15.0);
    assert!(snapshot.delta_time <= 1.0 / 15.0 + EPSILON);
    assert!(approx(snapshot.elapsed, 1.0 / 15.0));
}

#[test]
fn first_frame_and_backwards_clock_have_zero_delta() {
    let hub = SignalHub::default();
    assert_eq!(hub.tick(100.0).delta_time, 0.0);
    assert_eq!(hub.tick(99.0).delta_time, 0.0);
    assert_eq!(hub.tick(f64::NAN).delta_time, 0.0);
}

#[test]
fn custom_delta_ceiling() {
    let hub = SignalHub::new(HubConfig {
        max_delta_seconds: 0.5,
        ..HubConfig::default()
    });
    hub.tick(0.0);
    assert!(approx(hub.tick(0.25).delta_time, 0.25));
    assert!(approx(hub.tick(5.0).delta_time, 0.5));
}

#[test]
fn tick_timer_advances_frames() {
    let hub = SignalHub::default();
    let mut timer = Timer::new();
    let a = hub.tick_timer(&mut timer);
    let b = hub.tick_timer(&mut timer);
    assert_eq!(b.frame, a.frame + 1);
    assert!(b.wall_clock_time >= a.wall_clock_time);
}

// ============================================================================
// Inputs
// ============================================================================

#[test]
fn inputs_are_clamped() {
    let hub = SignalHub::default();
    hub.set_audio_levels(2.0, -1.0, 0.5);
    hub.set_scroll_progress(1.5);
    hub.set_blessing_wave_progress(f32::NAN);
    hub.set_camera_fov(500.0);

    let s = hub.tick(0.0);
    assert_eq!(s.bass_level, 1.0);
    assert_eq!(s.mid_level, 0.0);
    assert_eq!(s.high_level, 0.5);
    assert_eq!(s.scroll_progress, 1.0);
    assert_eq!(s.blessing_wave_progress, 0.0);
    assert_eq!(s.camera_fov, 179.0);

    hub.set_camera_fov(f32::INFINITY);
    assert_eq!(hub.tick(0.1).camera_fov, 60.0);
}

#[test]
fn blessing_pulse_peaks_mid_wave() {
    let mid = SignalSnapshot {
        blessing_wave_progress: 0.5,
        ..SignalSnapshot::default()
    };
    let end = SignalSnapshot {
        blessing_wave_progress: 1.0,
        ..SignalSnapshot::default()
    };
    assert!(approx(mid.blessing_pulse(), 1.0));
    assert!(end.blessing_pulse().abs() < 1e-4);
}

// ============================================================================
// Fault isolation
// ============================================================================

#[test]
fn failing_subscribers_do_not_stop_the_broadcast() {
    let hub = SignalHub::default();
    let healthy = counter();

    hub.register_effect("erroring", |_| Err(HaloError::Backend("shader lost".into())));
    hub.register_effect("panicking", |_| panic!("effect exploded"));
    hub.register_effect("healthy", counting(Arc::clone(&healthy)));

    hub.tick(0.0);
    hub.tick(0.016);

    assert_eq!(healthy.load(Ordering::SeqCst), 2);
    assert_eq!(hub.fault_count("erroring"), 2);
    assert_eq!(hub.fault_count("panicking"), 2);
    assert_eq!(hub.fault_count("healthy"), 0);
    // A faulting subscriber stays registered.
    assert!(hub.is_registered("panicking"));
}
