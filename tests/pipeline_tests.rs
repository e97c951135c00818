//! Pipeline Builder and Executor Tests
//!
//! Tests for:
//! - Build-time validation of passes against program declarations
//! - Target cleanup when a build fails
//! - Parameter slots
//! - Bloom pyramid topology per tier, and rebuild determinism
//! - Execution order and stale-target detection

use glam::{Vec2, Vec4};

use halo::renderer::backend::cpu::Image;
use halo::renderer::backend::{CpuBackend, DrawTarget, TextureRef};
use halo::renderer::graph::passes::{Bloom, blit_program};
use halo::renderer::graph::{
    BuildContext, FrameIo, InputSource, OwnerId, ParamValue, PassDesc, PassOutput, Pipeline,
    PipelineBuilder, PoolConfig, ProgramRegistry, RenderTargetPool, ShaderProgram, TargetFormat,
};
use halo::renderer::quality::{QualityTier, TierParams};
use halo::{Effect, HaloError};

struct Harness {
    backend: CpuBackend,
    pool: RenderTargetPool,
    registry: ProgramRegistry,
    tier: TierParams,
    owner: OwnerId,
}

impl Harness {
    fn new(width: u32, height: u32) -> Self {
        Self {
            backend: CpuBackend::new(),
            pool: RenderTargetPool::new(PoolConfig::default(), width, height),
            registry: ProgramRegistry::new(),
            tier: TierParams::for_tier(QualityTier::High),
            owner: OwnerId::next(),
        }
    }

    fn ctx(&mut self) -> BuildContext<'_> {
        BuildContext {
            pool: &mut self.pool,
            backend: &mut self.backend,
            registry: &mut self.registry,
            tier: &self.tier,
            owner: self.owner,
        }
    }

    fn build_bloom(&mut self) -> Pipeline {
        let mut ctx = self.ctx();
        Bloom::default().build(&mut ctx).unwrap()
    }
}

fn threshold_program() -> ShaderProgram {
    ShaderProgram::new("bloom_threshold", "bloom_threshold")
        .input("scene")
        .param("threshold", 0.85)
}

fn assert_misconfigured(result: halo::Result<impl std::fmt::Debug>, needle: &str) {
    match result {
        Err(HaloError::Misconfigured { reason, .. }) => {
            assert!(reason.contains(needle), "unexpected reason: {reason}");
        }
        other => panic!("expected Misconfigured ({needle}), got {other:?}"),
    }
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn undeclared_parameter_is_rejected() {
    let mut h = Harness::new(64, 64);
    let mut ctx = h.ctx();
    let mut b = PipelineBuilder::new("test", &mut ctx);
    let result = b.add_pass(
        PassDesc::new("blit", blit_program())
            .input("source", InputSource::PipelineInput)
            .param("gain", 2.0)
            .to_final(),
    );
    assert_misconfigured(result, "does not declare");
}

#[test]
fn parameter_kind_mismatch_is_rejected() {
    let mut h = Harness::new(64, 64);
    let mut ctx = h.ctx();
    let mut b = PipelineBuilder::new("test", &mut ctx);
    let result = b.add_pass(
        PassDesc::new("threshold", threshold_program())
            .input("scene", InputSource::PipelineInput)
            .param("threshold", Vec2::ONE)
            .to_final(),
    );
    assert_misconfigured(result, "declares Float");
}

#[test]
fn parameter_the_kernel_never_reads_is_caught_at_build() {
    let mut h = Harness::new(64, 64);
    let mut ctx = h.ctx();
    let mut b = PipelineBuilder::new("test", &mut ctx);
    let typo = ShaderProgram::new("threshold_typo", "bloom_threshold")
        .input("scene")
        .param("treshold", 0.85);
    let result = b.add_pass(
        PassDesc::new("threshold", typo)
            .input("scene", InputSource::PipelineInput)
            .to_final(),
    );
    assert_misconfigured(result, "does not declare parameter 'threshold'");
}

#[test]
fn unbound_input_is_rejected() {
    let mut h = Harness::new(64, 64);
    let mut ctx = h.ctx();
    let mut b = PipelineBuilder::new("test", &mut ctx);
    let result = b.add_pass(PassDesc::new("blit", blit_program()).to_final());
    assert_misconfigured(result, "unbound");
}

#[test]
fn missing_output_is_rejected() {
    let mut h = Harness::new(64, 64);
    let mut ctx = h.ctx();
    let mut b = PipelineBuilder::new("test", &mut ctx);
    let result = b.add_pass(
        PassDesc::new("blit", blit_program()).input("source", InputSource::PipelineInput),
    );
    assert_misconfigured(result, "no output");
}

#[test]
fn reading_and_writing_the_same_target_is_rejected() {
    let mut h = Harness::new(64, 64);
    let mut ctx = h.ctx();
    let mut b = PipelineBuilder::new("test", &mut ctx);
    let target = b.target("a", 1.0, 1.0, TargetFormat::Rgba16Float).unwrap();
    let first = b
        .add_pass(
            PassDesc::new("first", blit_program())
                .input("source", InputSource::PipelineInput)
                .target(target),
        )
        .unwrap();
    let result = b.add_pass(
        PassDesc::new("second", blit_program())
            .input("source", InputSource::Pass(first))
            .target(target),
    );
    assert_misconfigured(result, "same target");
}

#[test]
fn second_producer_of_a_target_is_rejected() {
    let mut h = Harness::new(64, 64);
    let mut ctx = h.ctx();
    let mut b = PipelineBuilder::new("test", &mut ctx);
    let target = b.target("a", 1.0, 1.0, TargetFormat::Rgba16Float).unwrap();
    b.add_pass(
        PassDesc::new("first", blit_program())
            .input("source", InputSource::PipelineInput)
            .target(target),
    )
    .unwrap();
    let result = b.add_pass(
        PassDesc::new("second", blit_program())
            .input("source", InputSource::PipelineInput)
            .target(target),
    );
    assert_misconfigured(result, "already produced");
}

#[test]
fn passes_after_the_final_pass_are_rejected() {
    let mut h = Harness::new(64, 64);
    let mut ctx = h.ctx();
    let mut b = PipelineBuilder::new("test", &mut ctx);
    let blit = || PassDesc::new("blit", blit_program()).input("source", InputSource::PipelineInput);

    b.add_pass(blit().to_final()).unwrap();
    assert_misconfigured(b.add_pass(blit().to_final()), "after the final pass");
}

#[test]
fn duplicate_pass_labels_are_rejected() {
    let mut h = Harness::new(64, 64);
    let mut ctx = h.ctx();
    let mut b = PipelineBuilder::new("test", &mut ctx);
    let target = b.target("a", 1.0, 1.0, TargetFormat::Rgba16Float).unwrap();
    b.add_pass(
        PassDesc::new("blit", blit_program())
            .input("source", InputSource::PipelineInput)
            .target(target),
    )
    .unwrap();
    let result = b.add_pass(
        PassDesc::new("blit", blit_program())
            .input("source", InputSource::PipelineInput)
            .to_final(),
    );
    assert_misconfigured(result, "duplicate pass label");
}

#[test]
fn empty_pipeline_and_missing_final_are_rejected() {
    let mut h = Harness::new(64, 64);
    {
        let mut ctx = h.ctx();
        let b = PipelineBuilder::new("empty", &mut ctx);
        assert_misconfigured(b.build(), "no passes");
    }

    let mut ctx = h.ctx();
    let mut b = PipelineBuilder::new("open", &mut ctx);
    let target = b.target("a", 1.0, 1.0, TargetFormat::Rgba16Float).unwrap();
    b.add_pass(
        PassDesc::new("blit", blit_program())
            .input("source", InputSource::PipelineInput)
            .target(target),
    )
    .unwrap();
    assert_misconfigured(b.build(), "does not write the final output");
}

#[test]
fn conflicting_program_declarations_are_rejected() {
    let mut h = Harness::new(64, 64);
    let mut ctx = h.ctx();
    {
        let mut b = PipelineBuilder::new("first", &mut ctx);
        let other = ShaderProgram::new("blit", "blit").input("source").param("gain", 1.0);
        b.add_pass(
            PassDesc::new("blit", other)
                .input("source", InputSource::PipelineInput)
                .to_final(),
        )
        .unwrap();
    }

    let mut b = PipelineBuilder::new("second", &mut ctx);
    let result = b.add_pass(
        PassDesc::new("blit", blit_program())
            .input("source", InputSource::PipelineInput)
            .to_final(),
    );
    assert!(matches!(result, Err(HaloError::ProgramConflict(_))));
}

#[test]
fn failed_build_releases_its_targets() {
    let mut h = Harness::new(64, 64);
    {
        let mut ctx = h.ctx();
        let mut b = PipelineBuilder::new("test", &mut ctx);
        b.target("a", 1.0, 1.0, TargetFormat::Rgba16Float).unwrap();
        b.target("b", 0.5, 0.5, TargetFormat::Rgba16Float).unwrap();
        assert!(b.build().is_err());
    }
    assert_eq!(h.pool.outstanding_for(h.owner), 0);
    assert_eq!(h.pool.free_count(), 2);
}

// ============================================================================
// Slots
// ============================================================================

#[test]
fn slots_write_parameters_by_position() {
    let mut h = Harness::new(64, 64);
    let mut pipeline = {
        let mut ctx = h.ctx();
        let mut b = PipelineBuilder::new("test", &mut ctx);
        b.add_pass(
            PassDesc::new("extract", threshold_program())
                .input("scene", InputSource::PipelineInput)
                .to_final(),
        )
        .unwrap();
        b.build().unwrap()
    };

    // Unbound parameters start at their declared default.
    let pass = pipeline.pass("extract").unwrap();
    assert_eq!(pass.param("threshold"), Some(ParamValue::Float(0.85)));

    let slot = pipeline.slot("extract", "threshold").unwrap();
    pipeline.set(slot, 0.25);
    assert_eq!(pipeline.get(slot), Some(ParamValue::Float(0.25)));
    assert_eq!(
        pipeline.pass("extract").unwrap().param("threshold"),
        Some(ParamValue::Float(0.25))
    );

    assert!(pipeline.slot("extract", "missing").is_err());
    assert!(pipeline.slot("missing", "threshold").is_err());
}

// ============================================================================
// Bloom topology
// ============================================================================

#[test]
fn bloom_pyramid_has_fourteen_passes_and_thirteen_targets() {
    let mut h = Harness::new(1920, 1080);
    let pipeline = h.build_bloom();

    let labels: Vec<&str> = pipeline.passes().iter().map(|p| p.label()).collect();
    assert_eq!(
        labels,
        vec![
            "threshold", "down1", "down2", "down3", "down4", "down5", "down6", "up5", "up4",
            "up3", "up2", "up1", "up0", "composite",
        ]
    );
    assert_eq!(
        pipeline.target_dimensions(),
        vec![
            (1920, 1080),
            (960, 540),
            (480, 270),
            (240, 135),
            (120, 67),
            (60, 33),
            (30, 16),
            (60, 33),
            (120, 67),
            (240, 135),
            (480, 270),
            (960, 540),
            (1920, 1080),
        ]
    );
    assert_eq!(pipeline.passes().last().unwrap().output(), PassOutput::Final);
    assert!(!pipeline.uses_depth());
    assert_eq!(h.pool.outstanding_for(h.owner), 13);
}

#[test]
fn low_tier_keeps_a_full_resolution_bloom_base() {
    let mut h = Harness::new(1920, 1080);
    h.tier = TierParams::for_tier(QualityTier::Low);
    let pipeline = h.build_bloom();
    assert_eq!(pipeline.target_dimensions()[0], (1920, 1080));
    assert_eq!(pipeline.target_dimensions()[6], (30, 16));
}

#[test]
fn tiny_viewport_clamps_every_stage() {
    let mut h = Harness::new(20, 10);
    let pipeline = h.build_bloom();
    assert!(pipeline.target_dimensions().iter().all(|&(w, h)| w >= 1 && h >= 1));
    assert_eq!(pipeline.target_dimensions()[6], (1, 1));
}

#[test]
fn pyramid_halves_per_stage_for_any_viewport() {
    let sizes = [
        (1, 1),
        (1, 7),
        (7, 1),
        (3, 3),
        (5, 3),
        (17, 9),
        (63, 65),
        (400, 300),
        (767, 431),
        (1921, 1081),
    ];
    for tier in [QualityTier::High, QualityTier::Medium, QualityTier::Low] {
        for (w, h) in sizes {
            let mut harness = Harness::new(w, h);
            harness.tier = TierParams::for_tier(tier);
            let pipeline = harness.build_bloom();

            // Sizes of the images the backend actually allocated.
            let leased: Vec<(u32, u32)> = pipeline
                .targets()
                .iter()
                .map(|t| {
                    let id = harness.pool.resolve(t).unwrap();
                    harness.backend.target_image(id).unwrap().size()
                })
                .collect();
            assert_eq!(leased, pipeline.target_dimensions(), "{tier:?} {w}x{h}");
            for k in 0..=6u32 {
                let expected = ((w >> k).max(1), (h >> k).max(1));
                assert_eq!(leased[k as usize], expected, "{tier:?} {w}x{h} stage {k}");
            }
            pipeline.release(&mut harness.pool);
        }
    }
}

#[test]
fn rebuild_after_release_has_identical_dimensions() {
    let mut h = Harness::new(1280, 720);
    let first = h.build_bloom();
    let dims = first.target_dimensions();
    first.release(&mut h.pool);
    assert_eq!(h.pool.outstanding_for(h.owner), 0);
    let allocated = h.backend.target_count();

    let second = h.build_bloom();
    assert_eq!(second.target_dimensions(), dims);
    // Every target came back from the free list.
    assert_eq!(h.backend.target_count(), allocated);
}

// ============================================================================
// Execution
// ============================================================================

#[test]
fn execute_issues_one_draw_per_pass_in_order() {
    let mut h = Harness::new(32, 16);
    let pipeline = h.build_bloom();
    let scene = h.backend.upload_external(Image::filled(32, 16, Vec4::new(0.2, 0.2, 0.2, 1.0)));

    pipeline
        .execute(
            &mut h.backend,
            &h.pool,
            &FrameIo {
                input: TextureRef::External(scene),
                depth: None,
                output: DrawTarget::Present,
                output_size: (32, 16),
            },
        )
        .unwrap();

    let drawn: Vec<&str> = h.backend.draw_log().iter().map(|d| d.label.as_str()).collect();
    let declared: Vec<&str> = pipeline.passes().iter().map(|p| p.label()).collect();
    assert_eq!(drawn, declared);
    assert_eq!(h.backend.draw_log().last().unwrap().output, DrawTarget::Present);
}

#[test]
fn executing_after_resize_reports_stale_targets() {
    let mut h = Harness::new(32, 16);
    let pipeline = h.build_bloom();
    let scene = h.backend.upload_external(Image::new(32, 16));
    h.pool.resize_viewport(64, 32);

    let result = pipeline.execute(
        &mut h.backend,
        &h.pool,
        &FrameIo {
            input: TextureRef::External(scene),
            depth: None,
            output: DrawTarget::Present,
            output_size: (64, 32),
        },
    );
    assert!(matches!(result, Err(HaloError::StaleTarget(_))));
    assert!(h.backend.draw_log().is_empty());
}
