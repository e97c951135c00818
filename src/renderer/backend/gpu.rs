//! wgpu Backend
//!
//! Lowers [`DrawCommand`]s to full-screen-triangle render passes on a wgpu
//! device. Every program gets one bind group layout generated from its
//! declaration (inputs, one filtering sampler, an optional uniform block);
//! render pipelines are cached per `(program, output format, blend)`.
//!
//! All draws of a frame are recorded into one command encoder and submitted
//! together by [`RenderBackend::submit`], so passes execute in submission
//! order and need no explicit synchronisation.
//!
//! # Host Integration
//!
//! ```rust,ignore
//! let mut backend = GpuBackend::new(device.clone(), queue.clone(), surface_format);
//! let scene = backend.register_external(scene_view);
//! // per frame:
//! backend.set_present_target(surface_texture_view);
//! stack.render_frame(&mut backend, &io, now)?;
//! ```

use rustc_hash::FxHashMap;

use super::shader_manager::{ShaderManager, sampler_binding, uniform_binding};
use super::{DrawCommand, DrawTarget, ExternalTexture, RenderBackend, TargetDesc, TextureRef};
use crate::errors::{HaloError, Result};
use crate::renderer::graph::params::pack_uniforms;
use crate::renderer::graph::pass::BlendMode;
use crate::renderer::graph::program::{ProgramId, ShaderProgram};
use crate::renderer::graph::target_pool::{FilterMode, TargetFormat, TargetId};

/// Maps a pool format to the wgpu texture format.
#[must_use]
pub fn texture_format(format: TargetFormat) -> wgpu::TextureFormat {
    match format {
        TargetFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TargetFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TargetFormat::R16Float => wgpu::TextureFormat::R16Float,
    }
}

fn blend_state(blend: BlendMode) -> wgpu::BlendState {
    match blend {
        BlendMode::Replace => wgpu::BlendState::REPLACE,
        BlendMode::Additive => wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent::OVER,
        },
    }
}

struct GpuTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    filter: FilterMode,
}

struct GpuProgram {
    name: &'static str,
    module: wgpu::ShaderModule,
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    input_count: usize,
    has_uniforms: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    format: wgpu::TextureFormat,
    blend: BlendMode,
}

/// GPU backend on a wgpu device and queue.
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    shader_manager: ShaderManager,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,

    programs: FxHashMap<ProgramId, GpuProgram>,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
    targets: FxHashMap<TargetId, GpuTarget>,
    externals: Vec<wgpu::TextureView>,
    present: Option<wgpu::TextureView>,

    encoder: Option<wgpu::CommandEncoder>,
    /// Uniform buffers referenced by recorded draws; dropped after submit.
    frame_buffers: Vec<wgpu::Buffer>,
    uniform_scratch: Vec<u8>,
}

impl GpuBackend {
    #[must_use]
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, surface_format: wgpu::TextureFormat) -> Self {
        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Post Linear Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let nearest_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Post Nearest Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            device,
            queue,
            surface_format,
            shader_manager: ShaderManager::new(),
            linear_sampler,
            nearest_sampler,
            programs: FxHashMap::default(),
            pipelines: FxHashMap::default(),
            targets: FxHashMap::default(),
            externals: Vec::new(),
            present: None,
            encoder: None,
            frame_buffers: Vec::new(),
            uniform_scratch: Vec::new(),
        }
    }

    /// Registers a host texture view (scene color or depth).
    pub fn register_external(&mut self, view: wgpu::TextureView) -> ExternalTexture {
        self.externals.push(view);
        ExternalTexture((self.externals.len() - 1) as u32)
    }

    /// Points an existing external handle at a new view (e.g. after the host
    /// recreated its scene buffers on resize).
    pub fn replace_external(&mut self, texture: ExternalTexture, view: wgpu::TextureView) -> Result<()> {
        let slot = self
            .externals
            .get_mut(texture.0 as usize)
            .ok_or_else(|| HaloError::Backend(format!("unknown external texture {}", texture.0)))?;
        *slot = view;
        Ok(())
    }

    /// Sets the view [`DrawTarget::Present`] renders into for this frame.
    pub fn set_present_target(&mut self, view: wgpu::TextureView) {
        self.present = Some(view);
    }

    #[inline]
    #[must_use]
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    #[inline]
    #[must_use]
    pub fn shader_manager(&self) -> &ShaderManager {
        &self.shader_manager
    }

    fn create_layout(&self, program: &ShaderProgram) -> wgpu::BindGroupLayout {
        let input_count = program.inputs().len();
        let mut entries: Vec<wgpu::BindGroupLayoutEntry> = (0..input_count)
            .map(|i| wgpu::BindGroupLayoutEntry {
                binding: i as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect();

        entries.push(wgpu::BindGroupLayoutEntry {
            binding: sampler_binding(input_count),
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });

        if !program.params().is_empty() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: uniform_binding(input_count),
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }

        self.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{} Layout", program.name())),
                entries: &entries,
            })
    }

    fn texture_view(&self, source: TextureRef) -> Result<(&wgpu::TextureView, FilterMode)> {
        match source {
            TextureRef::Target(id) => self
                .targets
                .get(&id)
                .map(|t| (&t.view, t.filter))
                .ok_or_else(|| HaloError::Backend(format!("draw reads unknown target {id:?}"))),
            TextureRef::External(ext) => self
                .externals
                .get(ext.0 as usize)
                .map(|view| (view, FilterMode::Linear))
                .ok_or_else(|| HaloError::Backend(format!("unknown external texture {}", ext.0))),
        }
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) -> Result<()> {
        if self.pipelines.contains_key(&key) {
            return Ok(());
        }
        let program = self
            .programs
            .get(&key.program)
            .ok_or_else(|| HaloError::UnknownProgram(format!("{:?}", key.program)))?;

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("{} Pipeline", program.name)),
                layout: Some(&program.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.module,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: key.format,
                        blend: Some(blend_state(key.blend)),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        log::debug!(
            "Render pipeline created: {} ({:?}, {:?})",
            program.name,
            key.format,
            key.blend
        );
        self.pipelines.insert(key, pipeline);
        Ok(())
    }
}

impl RenderBackend for GpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn prepare_program(&mut self, id: ProgramId, program: &ShaderProgram) -> Result<()> {
        if self.programs.contains_key(&id) {
            return Ok(());
        }

        let (module, hash) = self
            .shader_manager
            .get_or_compile_program(&self.device, program)?;
        let module = module.clone();

        let layout = self.create_layout(program);
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{} Pipeline Layout", program.name())),
                bind_group_layouts: &[Some(&layout)],
                immediate_size: 0,
            });

        log::debug!("Shader program '{}' prepared (source {hash:032x})", program.name());
        self.programs.insert(
            id,
            GpuProgram {
                name: program.name(),
                module,
                layout,
                pipeline_layout,
                input_count: program.inputs().len(),
                has_uniforms: !program.params().is_empty(),
            },
        );
        Ok(())
    }

    fn create_target(&mut self, id: TargetId, desc: &TargetDesc<'_>) -> Result<()> {
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width > max || desc.height > max {
            return Err(HaloError::Backend(format!(
                "{}x{} exceeds the device texture limit of {max}",
                desc.width, desc.height
            )));
        }

        let format = texture_format(desc.format);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        self.targets.insert(
            id,
            GpuTarget {
                _texture: texture,
                view,
                format,
                filter: desc.filter,
            },
        );
        Ok(())
    }

    fn destroy_target(&mut self, id: TargetId) {
        self.targets.remove(&id);
    }

    fn draw(&mut self, cmd: &DrawCommand<'_>) -> Result<()> {
        let (output_format, output_view) = match cmd.output {
            DrawTarget::Target(id) => {
                let target = self.targets.get(&id).ok_or_else(|| {
                    HaloError::Backend(format!("draw '{}' writes unknown target", cmd.label))
                })?;
                (target.format, target.view.clone())
            }
            DrawTarget::Present => {
                let view = self.present.clone().ok_or_else(|| {
                    HaloError::Backend(format!(
                        "draw '{}' presents but no presentation target is set",
                        cmd.label
                    ))
                })?;
                (self.surface_format, view)
            }
        };

        let key = PipelineKey {
            program: cmd.program,
            format: output_format,
            blend: cmd.blend,
        };
        self.ensure_pipeline(key)?;

        let program = self
            .programs
            .get(&cmd.program)
            .ok_or_else(|| HaloError::UnknownProgram(format!("{:?}", cmd.program)))?;
        if cmd.inputs.len() != program.input_count {
            return Err(HaloError::Backend(format!(
                "draw '{}' binds {} inputs, program '{}' declares {}",
                cmd.label,
                cmd.inputs.len(),
                program.name,
                program.input_count
            )));
        }

        let uniform_buffer = if program.has_uniforms {
            pack_uniforms(cmd.params, &mut self.uniform_scratch);
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(cmd.label),
                size: self.uniform_scratch.len() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.queue.write_buffer(&buffer, 0, &self.uniform_scratch);
            Some(buffer)
        } else {
            None
        };

        let mut views = Vec::with_capacity(cmd.inputs.len());
        let mut nearest = false;
        for &source in cmd.inputs {
            let (view, filter) = self.texture_view(source)?;
            nearest |= filter == FilterMode::Nearest;
            views.push(view);
        }
        let sampler = if nearest {
            &self.nearest_sampler
        } else {
            &self.linear_sampler
        };

        let mut entries: Vec<wgpu::BindGroupEntry<'_>> = views
            .iter()
            .enumerate()
            .map(|(i, view)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: sampler_binding(program.input_count),
            resource: wgpu::BindingResource::Sampler(sampler),
        });
        if let Some(buffer) = &uniform_buffer {
            entries.push(wgpu::BindGroupEntry {
                binding: uniform_binding(program.input_count),
                resource: buffer.as_entire_binding(),
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(cmd.label),
            layout: &program.layout,
            entries: &entries,
        });
        drop(entries);
        drop(views);

        let pipeline = self
            .pipelines
            .get(&key)
            .ok_or_else(|| HaloError::Backend(format!("pipeline for '{}' missing", cmd.label)))?;

        let load = match cmd.blend {
            BlendMode::Replace => wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
            BlendMode::Additive => wgpu::LoadOp::Load,
        };

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Post-Process Encoder"),
            })
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(cmd.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &output_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        if let Some(buffer) = uniform_buffer {
            self.frame_buffers.push(buffer);
        }
        Ok(())
    }

    fn submit(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
        }
        self.frame_buffers.clear();
    }
}
