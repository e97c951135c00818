//! Software Backend
//!
//! A reference implementation of [`RenderBackend`] that evaluates every
//! built-in program on the CPU with `f32` RGBA images. It produces the same
//! pass graph results as the GPU path (modulo texture precision) and is what
//! the test-suite and headless tools render with.
//!
//! Host textures are uploaded with [`CpuBackend::upload_external`]; draws to
//! [`DrawTarget::Present`] land in an image readable through
//! [`CpuBackend::presented`].

mod image;
mod kernels;

pub use image::{Image, LUMA, luminance};

use glam::Vec4;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use self::kernels::{Kernel, KernelArgs, Texture};
use super::{DrawCommand, DrawTarget, ExternalTexture, RenderBackend, TargetDesc, TextureRef};
use crate::errors::{HaloError, Result};
use crate::renderer::graph::pass::BlendMode;
use crate::renderer::graph::program::{ProgramId, ShaderProgram};
use crate::renderer::graph::target_pool::{FilterMode, TargetFormat, TargetId};

struct CpuTarget {
    image: Image,
    format: TargetFormat,
    filter: FilterMode,
    bytes: u64,
}

struct CpuProgram {
    program: ShaderProgram,
    kernel: Kernel,
}

/// One recorded draw, for inspection in tests and tools.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawRecord {
    pub label: String,
    pub template: &'static str,
    pub output: DrawTarget,
    pub size: (u32, u32),
}

/// CPU reference backend.
#[derive(Default)]
pub struct CpuBackend {
    programs: FxHashMap<ProgramId, CpuProgram>,
    targets: FxHashMap<TargetId, CpuTarget>,
    externals: Vec<Image>,
    presented: Option<Image>,
    memory_limit: Option<u64>,
    memory_used: u64,
    draws: Vec<DrawRecord>,
    submitted_draws: usize,
    submits: usize,
}

impl CpuBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that refuses target allocations beyond `bytes`, emulating
    /// device memory exhaustion.
    #[must_use]
    pub fn with_memory_limit(bytes: u64) -> Self {
        Self {
            memory_limit: Some(bytes),
            ..Self::default()
        }
    }

    /// Registers a host texture (scene color or depth).
    pub fn upload_external(&mut self, image: Image) -> ExternalTexture {
        self.externals.push(image);
        ExternalTexture((self.externals.len() - 1) as u32)
    }

    /// Replaces the contents of a previously uploaded host texture.
    pub fn update_external(&mut self, texture: ExternalTexture, image: Image) -> Result<()> {
        let slot = self
            .externals
            .get_mut(texture.0 as usize)
            .ok_or_else(|| HaloError::Backend(format!("unknown external texture {}", texture.0)))?;
        *slot = image;
        Ok(())
    }

    /// The image most recently written to the presentation surface.
    #[must_use]
    pub fn presented(&self) -> Option<&Image> {
        self.presented.as_ref()
    }

    /// Contents of a pooled target.
    #[must_use]
    pub fn target_image(&self, id: TargetId) -> Option<&Image> {
        self.targets.get(&id).map(|t| &t.image)
    }

    #[must_use]
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn memory_used(&self) -> u64 {
        self.memory_used
    }

    #[must_use]
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Every draw recorded since the last [`clear_draw_log`](Self::clear_draw_log).
    #[must_use]
    pub fn draw_log(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn clear_draw_log(&mut self) {
        self.draws.clear();
        self.submitted_draws = 0;
    }

    #[must_use]
    pub fn submit_count(&self) -> usize {
        self.submits
    }

    fn texture(&self, source: TextureRef) -> Result<Texture<'_>> {
        match source {
            TextureRef::Target(id) => self
                .targets
                .get(&id)
                .map(|t| Texture {
                    image: &t.image,
                    filter: t.filter,
                })
                .ok_or_else(|| HaloError::Backend(format!("draw reads unknown target {id:?}"))),
            TextureRef::External(ext) => self
                .externals
                .get(ext.0 as usize)
                .map(|image| Texture {
                    image,
                    filter: FilterMode::Linear,
                })
                .ok_or_else(|| HaloError::Backend(format!("unknown external texture {}", ext.0))),
        }
    }
}

/// Drops channels the target format cannot store.
fn store(format: TargetFormat, color: Vec4) -> Vec4 {
    match format {
        TargetFormat::Rgba16Float => color,
        TargetFormat::Rgba8Unorm => color.clamp(Vec4::ZERO, Vec4::ONE),
        TargetFormat::R16Float => Vec4::new(color.x, 0.0, 0.0, 1.0),
    }
}

fn blend_into(dst: &mut Image, src: &Image, blend: BlendMode, format: TargetFormat) {
    for (d, s) in dst.pixels_mut().iter_mut().zip(src.pixels()) {
        let color = match blend {
            BlendMode::Replace => *s,
            BlendMode::Additive => *d + *s,
        };
        *d = store(format, color);
    }
}

impl RenderBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn prepare_program(&mut self, id: ProgramId, program: &ShaderProgram) -> Result<()> {
        if self.programs.contains_key(&id) {
            return Ok(());
        }
        let builtin = kernels::builtin(program.template())
            .ok_or_else(|| HaloError::UnknownProgram(program.template().to_string()))?;
        builtin
            .check(program)
            .map_err(|reason| HaloError::misconfigured(program.name(), reason))?;
        self.programs.insert(
            id,
            CpuProgram {
                program: program.clone(),
                kernel: builtin.kernel,
            },
        );
        log::debug!("CPU kernel '{}' prepared", program.name());
        Ok(())
    }

    fn create_target(&mut self, id: TargetId, desc: &TargetDesc<'_>) -> Result<()> {
        let bytes =
            u64::from(desc.width) * u64::from(desc.height) * desc.format.bytes_per_pixel();
        if let Some(limit) = self.memory_limit
            && self.memory_used + bytes > limit
        {
            return Err(HaloError::Backend(format!(
                "out of device memory ({} + {bytes} > {limit} bytes)",
                self.memory_used
            )));
        }

        self.memory_used += bytes;
        self.targets.insert(
            id,
            CpuTarget {
                image: Image::new(desc.width, desc.height),
                format: desc.format,
                filter: desc.filter,
                bytes,
            },
        );
        Ok(())
    }

    fn destroy_target(&mut self, id: TargetId) {
        if let Some(target) = self.targets.remove(&id) {
            self.memory_used = self.memory_used.saturating_sub(target.bytes);
        }
    }

    fn draw(&mut self, cmd: &DrawCommand<'_>) -> Result<()> {
        let entry = self
            .programs
            .get(&cmd.program)
            .ok_or_else(|| HaloError::UnknownProgram(format!("{:?}", cmd.program)))?;
        let program = &entry.program;

        if cmd.inputs.len() != program.inputs().len() || cmd.params.len() != program.params().len()
        {
            return Err(HaloError::Backend(format!(
                "draw '{}' does not match program '{}' ({} inputs, {} params)",
                cmd.label,
                program.name(),
                cmd.inputs.len(),
                cmd.params.len()
            )));
        }
        if let DrawTarget::Target(out) = cmd.output
            && cmd.inputs.contains(&TextureRef::Target(out))
        {
            return Err(HaloError::Backend(format!(
                "draw '{}' reads the target it writes",
                cmd.label
            )));
        }

        let mut inputs: SmallVec<[Texture<'_>; 4]> = SmallVec::new();
        for &source in cmd.inputs {
            inputs.push(self.texture(source)?);
        }

        let result = (entry.kernel)(&KernelArgs {
            program,
            params: cmd.params,
            inputs: &inputs,
            size: cmd.output_size,
        });
        let template = program.template();
        drop(inputs);

        match cmd.output {
            DrawTarget::Target(id) => {
                let target = self.targets.get_mut(&id).ok_or_else(|| {
                    HaloError::Backend(format!("draw '{}' writes unknown target", cmd.label))
                })?;
                if target.image.size() != result.size() {
                    return Err(HaloError::Backend(format!(
                        "draw '{}' output size {:?} does not match target {:?}",
                        cmd.label,
                        result.size(),
                        target.image.size()
                    )));
                }
                blend_into(&mut target.image, &result, cmd.blend, target.format);
            }
            DrawTarget::Present => {
                let surface = self
                    .presented
                    .get_or_insert_with(|| Image::new(result.width(), result.height()));
                if surface.size() != result.size() || cmd.blend == BlendMode::Replace {
                    *surface = Image::new(result.width(), result.height());
                }
                blend_into(surface, &result, cmd.blend, TargetFormat::Rgba8Unorm);
            }
        }

        self.draws.push(DrawRecord {
            label: cmd.label.to_string(),
            template,
            output: cmd.output,
            size: cmd.output_size,
        });
        Ok(())
    }

    fn submit(&mut self) {
        let recorded = self.draws.len() - self.submitted_draws;
        self.submitted_draws = self.draws.len();
        self.submits += 1;
        log::trace!("CPU backend submitted {recorded} draws");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_respects_format() {
        let c = Vec4::new(2.0, -1.0, 0.5, 1.0);
        assert_eq!(store(TargetFormat::Rgba16Float, c), c);
        assert_eq!(store(TargetFormat::Rgba8Unorm, c), Vec4::new(1.0, 0.0, 0.5, 1.0));
        assert_eq!(store(TargetFormat::R16Float, c), Vec4::new(2.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn additive_blend_accumulates() {
        let mut dst = Image::filled(2, 2, Vec4::splat(0.25));
        let src = Image::filled(2, 2, Vec4::splat(0.5));
        blend_into(&mut dst, &src, BlendMode::Additive, TargetFormat::Rgba16Float);
        assert!(dst.pixels().iter().all(|p| *p == Vec4::splat(0.75)));
    }
}
