//! Effect Stack Tests
//!
//! End-to-end frames on the CPU reference backend:
//! - Bloom threshold and glow behavior
//! - Chaining through the ping-pong targets
//! - Passthrough when nothing presents
//! - Failure isolation inside a running stack
//! - Identity settings for grain and grading
//! - Resize, tier changes and dispose
//! - Loading settings and configuration from JSON

use glam::Vec4;

use halo::renderer::backend::cpu::Image;
use halo::renderer::backend::{DrawTarget, TextureRef};
use halo::renderer::graph::ParamValue;
use halo::resources::{BloomSettings, ColorGradingSettings, FilmGrainSettings};
use halo::{
    Bloom, ColorGrading, CpuBackend, EffectStack, EffectStatus, FilmGrain, GodRays, HaloError,
    LensGlare, QualityTier, SignalHub, StackConfig,
};

/// One 8-bit quantization step of the presentation surface.
const STORE_EPSILON: f32 = 1.0 / 255.0 + 1e-4;

fn stack(width: u32, height: u32) -> (SignalHub, EffectStack) {
    let hub = SignalHub::default();
    let stack = EffectStack::new(StackConfig::default(), &hub, width, height);
    (hub, stack)
}

fn gradient(width: u32, height: u32) -> Image {
    Image::from_fn(width, height, |x, y| {
        let r = ((x * 7 + y * 3) % 200) as f32 / 255.0;
        let g = ((x * 5 + y * 11) % 180) as f32 / 255.0;
        Vec4::new(r, g, 0.25, 1.0)
    })
}

fn assert_images_close(actual: &Image, expected: &Image, epsilon: f32) {
    assert_eq!(actual.size(), expected.size());
    for (i, (a, e)) in actual.pixels().iter().zip(expected.pixels()).enumerate() {
        assert!(
            (a.truncate() - e.truncate()).abs().max_element() <= epsilon,
            "pixel {i}: {a:?} != {e:?}"
        );
    }
}

fn draw_labels(backend: &CpuBackend) -> Vec<&str> {
    backend.draw_log().iter().map(|d| d.label.as_str()).collect()
}

// ============================================================================
// Bloom
// ============================================================================

#[test]
fn uniform_scene_below_threshold_is_unchanged() {
    let (_hub, mut stack) = stack(1920, 1080);
    let mut backend = CpuBackend::new();
    stack.push_effect(Bloom::default()).unwrap();

    let input = Image::filled(1920, 1080, Vec4::new(0.5, 0.5, 0.5, 1.0));
    let scene = backend.upload_external(input.clone());
    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();

    assert_images_close(backend.presented().unwrap(), &input, STORE_EPSILON);
    assert_eq!(backend.draw_log().len(), 14);
}

#[test]
fn bright_pixels_bleed_into_their_neighbourhood() {
    let (_hub, mut stack) = stack(32, 32);
    let mut backend = CpuBackend::new();
    stack.push_effect(Bloom::default()).unwrap();

    let input = Image::from_fn(32, 32, |x, y| {
        if (12..20).contains(&x) && (12..20).contains(&y) {
            Vec4::ONE
        } else {
            Vec4::new(0.0, 0.0, 0.0, 1.0)
        }
    });
    let scene = backend.upload_external(input);
    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();

    let out = backend.presented().unwrap();
    assert!(out.get(10, 16).x > 0.0, "no glow next to the patch");
    assert!(out.get(16, 16).x > 0.99);
    // Far corner stays dark.
    assert!(out.get(0, 0).x < out.get(10, 16).x);
}

/// Black 32×32 scene with a gray 8×8 patch in the middle.
fn gray_patch(level: f32) -> Image {
    Image::from_fn(32, 32, |x, y| {
        if (12..20).contains(&x) && (12..20).contains(&y) {
            Vec4::new(level, level, level, 1.0)
        } else {
            Vec4::new(0.0, 0.0, 0.0, 1.0)
        }
    })
}

fn render_bloom_once(input: &Image) -> Image {
    let (_hub, mut stack) = stack(32, 32);
    let mut backend = CpuBackend::new();
    stack.push_effect(Bloom::default()).unwrap();
    let scene = backend.upload_external(input.clone());
    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();
    backend.presented().unwrap().clone()
}

#[test]
fn luminance_just_below_threshold_adds_no_glow() {
    let input = gray_patch(0.84);
    let out = render_bloom_once(&input);
    assert_images_close(&out, &input, 1e-6);
}

#[test]
fn luminance_just_above_threshold_glows() {
    let input = gray_patch(0.86);
    let out = render_bloom_once(&input);
    assert!(out.get(16, 16).x > 0.86, "patch did not brighten");
    assert!(out.get(10, 16).x > 0.0, "no glow next to the patch");
    assert!(out.get(16, 21).y > 0.0, "no glow below the patch");
}

#[test]
fn spread_equals_radius_without_bass() {
    let (hub, mut stack) = stack(64, 32);
    let mut backend = CpuBackend::new();
    let mut settings = BloomSettings::new();
    settings.set_radius(1.25);
    stack.push_effect(Bloom::new(settings)).unwrap();
    let scene = backend.upload_external(Image::new(64, 32));

    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();
    let spread = |stack: &EffectStack| {
        let pipeline = stack.controller("bloom").unwrap().pipeline().unwrap();
        pipeline.pass("up0").unwrap().param("spread")
    };
    assert_eq!(spread(&stack), Some(ParamValue::Float(1.25)));

    hub.set_audio_levels(1.0, 0.0, 0.0);
    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.016)
        .unwrap();
    let widened = spread(&stack).and_then(|v| v.as_f32()).unwrap();
    assert!(widened > 1.25);
}

// ============================================================================
// Chaining
// ============================================================================

#[test]
fn chained_effects_write_ping_then_present() {
    let (_hub, mut stack) = stack(32, 16);
    let mut backend = CpuBackend::new();
    stack.push_effect(Bloom::default()).unwrap();
    stack
        .push_effect(ColorGrading::new(ColorGradingSettings::identity()))
        .unwrap();
    let scene = backend.upload_external(gradient(32, 16));

    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();

    let log = backend.draw_log();
    let composite = log.iter().find(|d| d.template == "bloom_composite").unwrap();
    assert!(matches!(composite.output, DrawTarget::Target(_)));
    let last = log.last().unwrap();
    assert_eq!(last.label, "grade");
    assert_eq!(last.output, DrawTarget::Present);
    assert_eq!(backend.submit_count(), 1);
}

#[test]
fn single_effect_does_not_lease_ping_pong() {
    let (_hub, mut stack) = stack(32, 16);
    let mut backend = CpuBackend::new();
    stack
        .push_effect(ColorGrading::new(ColorGradingSettings::identity()))
        .unwrap();
    let scene = backend.upload_external(gradient(32, 16));

    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();
    assert_eq!(stack.pool().outstanding_for(stack.owner()), 0);
    assert_eq!(draw_labels(&backend), vec!["grade"]);
}

#[test]
fn dropping_to_one_effect_returns_the_ping_pong_targets() {
    let (_hub, mut stack) = stack(32, 16);
    let mut backend = CpuBackend::new();
    stack.push_effect(FilmGrain::default()).unwrap();
    stack
        .push_effect(ColorGrading::new(ColorGradingSettings::identity()))
        .unwrap();
    let scene = backend.upload_external(gradient(32, 16));

    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();
    assert_eq!(stack.pool().outstanding_for(stack.owner()), 2);

    assert!(stack.set_enabled("film_grain", false));
    for frame in 1..=4 {
        stack
            .render_frame(&mut backend, TextureRef::External(scene), None, f64::from(frame) * 0.016)
            .unwrap();
    }
    assert_eq!(stack.pool().outstanding_for(stack.owner()), 0);
    // Idle for longer than the pool keeps free targets around.
    assert_eq!(stack.pool().free_count(), 0);
    assert_eq!(stack.pool().allocated_bytes(), 0);
}

#[test]
fn empty_stack_blits_the_scene() {
    let (_hub, mut stack) = stack(16, 16);
    let mut backend = CpuBackend::new();
    let input = gradient(16, 16);
    let scene = backend.upload_external(input.clone());

    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();

    assert_eq!(draw_labels(&backend), vec!["blit"]);
    assert_images_close(backend.presented().unwrap(), &input, STORE_EPSILON);
}

// ============================================================================
// Failure isolation
// ============================================================================

#[test]
fn failing_sole_effect_falls_back_to_passthrough() {
    let (hub, mut stack) = stack(32, 32);
    let mut backend = CpuBackend::with_memory_limit(1024);
    stack.push_effect(Bloom::default()).unwrap();
    let input = gradient(32, 32);
    let scene = backend.upload_external(input.clone());

    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();

    assert!(matches!(stack.status("bloom"), Some(EffectStatus::Disabled { .. })));
    assert!(!hub.is_registered("bloom"));
    assert_eq!(backend.draw_log().last().unwrap().label, "blit");
    assert_images_close(backend.presented().unwrap(), &input, STORE_EPSILON);
}

#[test]
fn failing_first_effect_hands_the_scene_to_the_next() {
    let (_hub, mut stack) = stack(32, 32);
    // Room for the two chaining targets, not for the bloom pyramid.
    let mut backend = CpuBackend::with_memory_limit(32 * 32 * 8 * 2 + 1024);
    stack.push_effect(Bloom::default()).unwrap();
    stack
        .push_effect(ColorGrading::new(ColorGradingSettings::identity()))
        .unwrap();
    let input = gradient(32, 32);
    let scene = backend.upload_external(input.clone());

    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();

    assert!(!stack.controller("bloom").unwrap().is_active());
    assert!(stack.controller("color_grading").unwrap().is_active());
    assert_eq!(draw_labels(&backend), vec!["grade"]);
    assert_images_close(backend.presented().unwrap(), &input, STORE_EPSILON);
}

#[test]
fn depth_starved_effect_is_skipped_for_the_frame() {
    let (_hub, mut stack) = stack(16, 16);
    let mut backend = CpuBackend::new();
    stack.push_effect(GodRays::default()).unwrap();
    let scene = backend.upload_external(gradient(16, 16));

    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();
    assert_eq!(draw_labels(&backend), vec!["blit"]);
    assert_eq!(stack.status("god_rays"), Some(EffectStatus::Active));

    backend.clear_draw_log();
    let depth = backend.upload_external(Image::filled(16, 16, Vec4::splat(1.0)));
    stack
        .render_frame(
            &mut backend,
            TextureRef::External(scene),
            Some(TextureRef::External(depth)),
            0.016,
        )
        .unwrap();
    assert_eq!(draw_labels(&backend), vec!["occlusion", "march", "composite"]);
}

// ============================================================================
// Identity settings
// ============================================================================

#[test]
fn zero_grain_is_identity() {
    let (_hub, mut stack) = stack(24, 24);
    let mut backend = CpuBackend::new();
    let mut settings = FilmGrainSettings::new();
    settings.set_intensity(0.0);
    settings.set_dust_density(0.0);
    stack.push_effect(FilmGrain::new(settings)).unwrap();
    let input = gradient(24, 24);
    let scene = backend.upload_external(input.clone());

    for frame in 0..3 {
        stack
            .render_frame(&mut backend, TextureRef::External(scene), None, f64::from(frame) * 0.016)
            .unwrap();
        assert_images_close(backend.presented().unwrap(), &input, STORE_EPSILON);
    }
}

#[test]
fn neutral_grade_is_identity() {
    let (hub, mut stack) = stack(24, 24);
    let mut backend = CpuBackend::new();
    stack
        .push_effect(ColorGrading::new(ColorGradingSettings::identity()))
        .unwrap();
    let input = gradient(24, 24);
    let scene = backend.upload_external(input.clone());

    // Animated inputs have no effect when their gains are zero.
    hub.set_scroll_progress(0.8);
    hub.set_blessing_wave_progress(0.5);
    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();
    assert_images_close(backend.presented().unwrap(), &input, STORE_EPSILON);
}

// ============================================================================
// Effect management
// ============================================================================

#[test]
fn duplicate_effect_ids_are_rejected() {
    let (_hub, mut stack) = stack(16, 16);
    stack.push_effect(Bloom::default()).unwrap();
    let result = stack.push_effect(Bloom::default());
    assert!(matches!(result, Err(HaloError::Misconfigured { .. })));

    stack.push_effect(Bloom::default().with_id("bloom_2")).unwrap();
    assert_eq!(stack.effect_ids(), vec!["bloom", "bloom_2"]);
}

#[test]
fn effect_mut_downcasts_to_the_concrete_type() {
    let (_hub, mut stack) = stack(16, 16);
    stack.push_effect(Bloom::default()).unwrap();

    stack
        .effect_mut::<Bloom>("bloom")
        .unwrap()
        .settings_mut()
        .set_strength(2.0);
    assert!((stack.effect_mut::<Bloom>("bloom").unwrap().settings().strength() - 2.0).abs() < 1e-6);

    assert!(stack.effect_mut::<GodRays>("bloom").is_none());
    assert!(stack.effect_mut::<Bloom>("missing").is_none());
}

#[test]
fn removed_effect_stops_receiving_signals() {
    let (hub, mut stack) = stack(16, 16);
    stack.push_effect(Bloom::default()).unwrap();
    assert!(stack.remove_effect("bloom"));
    assert!(!stack.remove_effect("bloom"));
    assert!(stack.is_empty());
    assert!(!hub.is_registered("bloom"));
}

#[test]
fn host_toggle_skips_the_effect() {
    let (_hub, mut stack) = stack(16, 16);
    let mut backend = CpuBackend::new();
    stack.push_effect(Bloom::default()).unwrap();
    assert!(stack.set_enabled("bloom", false));
    let scene = backend.upload_external(gradient(16, 16));

    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();
    assert_eq!(draw_labels(&backend), vec!["blit"]);
}

// ============================================================================
// Resize, tier and dispose
// ============================================================================

#[test]
fn resize_rebuilds_every_pipeline() {
    let (_hub, mut stack) = stack(32, 16);
    let mut backend = CpuBackend::new();
    stack.push_effect(Bloom::default()).unwrap();
    let scene = backend.upload_external(gradient(32, 16));
    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();

    stack.resize(64, 32);
    let scene = backend.upload_external(gradient(64, 32));
    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.016)
        .unwrap();

    let pipeline = stack.controller("bloom").unwrap().pipeline().unwrap();
    assert_eq!(pipeline.epoch(), stack.pool().epoch());
    assert_eq!(pipeline.target_dimensions()[0], (64, 32));
    assert_eq!(backend.presented().unwrap().size(), (64, 32));
}

#[test]
fn pinned_tier_rebuilds_with_new_parameters() {
    let (_hub, mut stack) = stack(64, 32);
    let mut backend = CpuBackend::new();
    stack.push_effect(Bloom::default()).unwrap();
    let scene = backend.upload_external(gradient(64, 32));
    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();
    assert_eq!(stack.tier().tier, QualityTier::Low);

    stack.set_quality_tier(QualityTier::High);
    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.016)
        .unwrap();
    assert_eq!(stack.tier().tier, QualityTier::High);
    let pipeline = stack.controller("bloom").unwrap().pipeline().unwrap();
    // Same geometry on both tiers, so the rebuild reused every target.
    assert_eq!(pipeline.target_dimensions()[0], (64, 32));
    assert_eq!(pipeline.target_dimensions()[6], (1, 1));
}

#[test]
fn removing_an_effect_frees_its_memory() {
    let (_hub, mut stack) = stack(64, 48);
    let mut backend = CpuBackend::new();
    stack.push_effect(Bloom::default()).unwrap();
    stack.push_effect(LensGlare::default()).unwrap();
    let scene = backend.upload_external(gradient(64, 48));

    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();
    let before = stack.pool().allocated_bytes();
    let backend_before = backend.memory_used();

    assert!(stack.remove_effect("bloom"));
    for frame in 1..=4 {
        stack
            .render_frame(&mut backend, TextureRef::External(scene), None, f64::from(frame) * 0.016)
            .unwrap();
    }

    assert!(stack.pool().allocated_bytes() < before);
    assert!(backend.memory_used() < backend_before);
    assert_eq!(stack.pool().free_count(), 0);
    assert_eq!(stack.pool().allocated_bytes(), backend.memory_used());
}

#[test]
fn tier_rebuild_releases_the_old_targets() {
    let (_hub, mut stack) = stack(64, 64);
    let mut backend = CpuBackend::new();
    stack.push_effect(GodRays::default()).unwrap();
    let scene = backend.upload_external(gradient(64, 64));
    let depth = backend.upload_external(Image::filled(64, 64, Vec4::splat(1.0)));
    let render = |stack: &mut EffectStack, backend: &mut CpuBackend, t: f64| {
        stack
            .render_frame(
                backend,
                TextureRef::External(scene),
                Some(TextureRef::External(depth)),
                t,
            )
            .unwrap();
    };

    stack.set_quality_tier(QualityTier::High);
    render(&mut stack, &mut backend, 0.0);
    let high = stack.pool().allocated_bytes();

    stack.set_quality_tier(QualityTier::Low);
    for frame in 1..=4 {
        render(&mut stack, &mut backend, f64::from(frame) * 0.016);
    }
    // Quarter-resolution mask instead of half.
    assert_eq!(stack.pool().allocated_bytes(), high / 4);
    assert_eq!(stack.pool().free_count(), 0);
}

#[test]
fn dispose_frees_everything() {
    let (hub, mut stack) = stack(32, 16);
    let mut backend = CpuBackend::new();
    stack.push_effect(Bloom::default()).unwrap();
    stack.push_effect(FilmGrain::default()).unwrap();
    let scene = backend.upload_external(gradient(32, 16));
    stack
        .render_frame(&mut backend, TextureRef::External(scene), None, 0.0)
        .unwrap();
    assert!(backend.target_count() > 0);

    stack.dispose(&mut backend);

    assert_eq!(hub.subscription_count(), 0);
    assert_eq!(stack.pool().live_count(), 0);
    assert_eq!(backend.target_count(), 0);
    assert_eq!(backend.memory_used(), 0);
    assert!(
        stack
            .render_frame(&mut backend, TextureRef::External(scene), None, 0.032)
            .is_err()
    );
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn stack_config_loads_with_defaults() {
    let config: StackConfig =
        serde_json::from_str(r#"{ "auto_tier": false, "pool": { "memory_budget_bytes": 1048576 } }"#)
            .unwrap();
    assert!(!config.auto_tier);
    assert_eq!(config.pool.memory_budget_bytes, Some(1_048_576));
    assert_eq!(config.thresholds.low_max_width, 768);

    let hub = SignalHub::default();
    let stack = EffectStack::new(config, &hub, 400, 300);
    // Without automatic selection the stack starts at the default tier.
    assert_eq!(stack.tier().tier, QualityTier::High);
}

#[test]
fn effect_settings_load_and_clamp() {
    let settings: BloomSettings = serde_json::from_str(r#"{ "strength": 100.0 }"#).unwrap();
    assert!((settings.threshold() - BloomSettings::default().threshold()).abs() < 1e-6);

    let bloom = Bloom::new(settings);
    assert!((bloom.settings().strength() - 4.0).abs() < 1e-6);
}
