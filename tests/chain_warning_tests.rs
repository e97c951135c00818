//! Effect Chaining Warning Tests
//!
//! Runs in its own binary because it installs a global logger:
//! - A chaining allocation failure is reported once per viewport epoch

use std::sync::atomic::{AtomicUsize, Ordering};

use glam::Vec4;
use log::{Level, LevelFilter, Log, Metadata, Record};

use halo::renderer::backend::TextureRef;
use halo::renderer::backend::cpu::Image;
use halo::resources::ColorGradingSettings;
use halo::{ColorGrading, CpuBackend, EffectStack, FilmGrain, SignalHub, StackConfig};

static CHAIN_WARNINGS: AtomicUsize = AtomicUsize::new(0);

struct WarningCounter;

impl Log for WarningCounter {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record<'_>) {
        if record.level() == Level::Warn
            && record.args().to_string().starts_with("Effect chaining unavailable")
        {
            CHAIN_WARNINGS.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn flush(&self) {}
}

static LOGGER: WarningCounter = WarningCounter;

#[test]
fn chaining_failure_warns_once_per_epoch() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Warn);

    let hub = SignalHub::default();
    let mut stack = EffectStack::new(StackConfig::default(), &hub, 32, 32);
    // Too small for a 32×32 chaining target; grain and grading need none.
    let mut backend = CpuBackend::with_memory_limit(1024);
    stack.push_effect(FilmGrain::default()).unwrap();
    stack
        .push_effect(ColorGrading::new(ColorGradingSettings::identity()))
        .unwrap();
    let scene = backend.upload_external(Image::filled(32, 32, Vec4::splat(0.5)));

    for frame in 0..5 {
        stack
            .render_frame(&mut backend, TextureRef::External(scene), None, f64::from(frame) * 0.016)
            .unwrap();
    }
    assert_eq!(CHAIN_WARNINGS.load(Ordering::SeqCst), 1);
    assert_eq!(stack.pool().outstanding_for(stack.owner()), 0);

    // A new viewport is a new epoch and gets one fresh report.
    stack.resize(24, 24);
    for frame in 5..8 {
        stack
            .render_frame(&mut backend, TextureRef::External(scene), None, f64::from(frame) * 0.016)
            .unwrap();
    }
    assert_eq!(CHAIN_WARNINGS.load(Ordering::SeqCst), 2);
}
