//! wgpu implementation of the graphics context
//!
//! Renders into an offscreen color target. Feedback passes run as compute
//! dispatches over storage buffers; readback goes through a staging buffer
//! mapped with `map_async` and a blocking `poll`.

use std::any::Any;

use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

use super::backend::{GpuBackend, GpuError};
use super::types::{
    BufferUsage, Capabilities, DrawSubmission, FeedbackPass, NativeHandle, PrimitiveKind,
    ProgramDesc, ProgramKind, TextureDesc, TextureFormat,
};
use crate::constants::{batching::MAX_UNIFORM_SLOTS, mutation::WORKGROUP_SIZE};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Storage bindings the mutation pass needs in one compute stage
const FEEDBACK_STORAGE_BINDINGS: u32 = 12;

#[derive(Debug, Clone)]
pub struct WgpuBackendConfig {
    pub width: u32,
    pub height: u32,
    pub power_preference: wgpu::PowerPreference,
}

impl Default for WgpuBackendConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            power_preference: wgpu::PowerPreference::HighPerformance,
        }
    }
}

enum WgpuObject {
    Buffer {
        buffer: wgpu::Buffer,
        size: u64,
    },
    Texture {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
    RenderProgram {
        bind_group_layout: wgpu::BindGroupLayout,
        pipelines: FxHashMap<PrimitiveKind, wgpu::RenderPipeline>,
    },
    FeedbackProgram {
        bind_group_layout: wgpu::BindGroupLayout,
        pipeline: wgpu::ComputePipeline,
    },
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    capabilities: Capabilities,
    max_buffer_size: u64,

    // Offscreen color target
    _target: wgpu::Texture,
    target_view: wgpu::TextureView,
    clear_pending: bool,

    sampler: wgpu::Sampler,
    _white_texture: wgpu::Texture,
    white_view: wgpu::TextureView,

    objects: FxHashMap<NativeHandle, WgpuObject>,
    next_handle: u64,
}

impl WgpuBackend {
    pub fn new(config: WgpuBackendConfig) -> Result<Self, GpuError> {
        log::info!("[WgpuBackend::new] Creating WGPU instance...");
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: config.power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(GpuError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        log::info!(
            "[WgpuBackend::new] Using adapter '{}' ({:?}, {:?})",
            adapter_info.name,
            adapter_info.device_type,
            adapter_info.backend
        );

        let limits = adapter.limits();
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Organism Render Device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits.clone(),
            },
            None,
        ))
        .map_err(|e| GpuError::DeviceRequest(e.to_string()))?;

        let suggested_memory_mb = match adapter_info.device_type {
            wgpu::DeviceType::DiscreteGpu => 1024,
            wgpu::DeviceType::IntegratedGpu | wgpu::DeviceType::VirtualGpu => 512,
            wgpu::DeviceType::Cpu | wgpu::DeviceType::Other => 256,
        };
        let capabilities = Capabilities {
            max_texture_size: limits.max_texture_dimension_2d,
            suggested_memory_mb,
            supports_feedback: limits.max_storage_buffers_per_shader_stage >= FEEDBACK_STORAGE_BINDINGS,
        };
        log::debug!("[WgpuBackend::new] Capabilities: {:?}", capabilities);

        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Target"),
            size: wgpu::Extent3d {
                width: config.width.max(1),
                height: config.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Organism Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let white_texture = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("White Texture"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );
        let white_view = white_texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            device,
            queue,
            adapter_info,
            capabilities,
            max_buffer_size: limits.max_buffer_size,
            _target: target,
            target_view,
            clear_pending: true,
            sampler,
            _white_texture: white_texture,
            white_view,
            objects: FxHashMap::default(),
            next_handle: 1,
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    fn insert(&mut self, object: WgpuObject) -> NativeHandle {
        let handle = NativeHandle(self.next_handle);
        self.next_handle += 1;
        self.objects.insert(handle, object);
        handle
    }

    fn build_render_program(
        &self,
        module: &wgpu::ShaderModule,
        desc: &ProgramDesc,
        vertex_attributes: &[u32],
    ) -> Result<WgpuObject, GpuError> {
        let mut offset = 0;
        let mut attributes = Vec::with_capacity(vertex_attributes.len());
        for (location, components) in vertex_attributes.iter().enumerate() {
            let format = match components {
                1 => wgpu::VertexFormat::Float32,
                2 => wgpu::VertexFormat::Float32x2,
                3 => wgpu::VertexFormat::Float32x3,
                4 => wgpu::VertexFormat::Float32x4,
                other => {
                    return Err(GpuError::Unsupported {
                        label: desc.label.clone(),
                        reason: format!("attribute {} has {} components", location, other),
                    })
                }
            };
            attributes.push(wgpu::VertexAttribute {
                format,
                offset,
                shader_location: location as u32,
            });
            offset += format.size();
        }

        let bind_group_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&desc.label),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&desc.label),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let mut pipelines = FxHashMap::default();
        for primitive in PrimitiveKind::ALL {
            let topology = match primitive {
                PrimitiveKind::Points => wgpu::PrimitiveTopology::PointList,
                PrimitiveKind::Lines => wgpu::PrimitiveTopology::LineList,
                PrimitiveKind::Triangles => wgpu::PrimitiveTopology::TriangleList,
                PrimitiveKind::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
            };
            let strip_index_format =
                (primitive == PrimitiveKind::TriangleStrip).then_some(wgpu::IndexFormat::Uint32);

            let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&desc.label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: "vs_main",
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: offset,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &attributes,
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TARGET_FORMAT,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    strip_index_format,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });
            pipelines.insert(primitive, pipeline);
        }

        Ok(WgpuObject::RenderProgram {
            bind_group_layout,
            pipelines,
        })
    }

    fn build_feedback_program(
        &self,
        module: &wgpu::ShaderModule,
        desc: &ProgramDesc,
        inputs: u32,
        outputs: u32,
    ) -> Result<WgpuObject, GpuError> {
        if !self.capabilities.supports_feedback || inputs + outputs > FEEDBACK_STORAGE_BINDINGS {
            return Err(GpuError::Unsupported {
                label: desc.label.clone(),
                reason: format!("needs {} storage bindings per stage", inputs + outputs),
            });
        }

        let storage_entry = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        entries.extend((0..inputs).map(|i| storage_entry(1 + i, true)));
        entries.extend((0..outputs).map(|i| storage_entry(1 + inputs + i, false)));

        let bind_group_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&desc.label),
            entries: &entries,
        });

        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&desc.label),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&desc.label),
            layout: Some(&layout),
            module,
            entry_point: "main",
        });

        Ok(WgpuObject::FeedbackProgram {
            bind_group_layout,
            pipeline,
        })
    }

    fn buffer(&self, handle: NativeHandle) -> Option<&wgpu::Buffer> {
        match self.objects.get(&handle) {
            Some(WgpuObject::Buffer { buffer, .. }) => Some(buffer),
            _ => None,
        }
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_buffer(&mut self, label: &str, contents: &[u8], usage: BufferUsage) -> Option<NativeHandle> {
        if contents.is_empty() || contents.len() as u64 > self.max_buffer_size {
            return None;
        }
        let usage = wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC
            | match usage {
                BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
                BufferUsage::Index => wgpu::BufferUsages::INDEX,
                BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
                BufferUsage::Storage => wgpu::BufferUsages::STORAGE,
            };
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage,
        });
        let size = buffer.size();
        Some(self.insert(WgpuObject::Buffer { buffer, size }))
    }

    fn create_texture(&mut self, label: &str, desc: &TextureDesc, data: Option<&[u8]>) -> Option<NativeHandle> {
        let max = self.capabilities.max_texture_size;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return None;
        }
        if data.is_some_and(|bytes| bytes.len() as u64 != desc.byte_size()) {
            return None;
        }

        let format = match desc.format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        };
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if desc.render_target {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });

        if let Some(bytes) = data {
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                bytes,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(desc.width * desc.format.bytes_per_pixel()),
                    rows_per_image: Some(desc.height),
                },
                size,
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Some(self.insert(WgpuObject::Texture { texture, view }))
    }

    fn compile_program(&mut self, desc: &ProgramDesc) -> Result<NativeHandle, GpuError> {
        log::info!("[WgpuBackend::compile_program] Compiling '{}'", desc.label);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.as_str().into()),
        });

        let built = match &desc.kind {
            ProgramKind::Render { vertex_attributes } => {
                self.build_render_program(&module, desc, vertex_attributes)
            }
            ProgramKind::Feedback { inputs, outputs, .. } => {
                self.build_feedback_program(&module, desc, *inputs, *outputs)
            }
        };

        let validation = pollster::block_on(self.device.pop_error_scope());
        if let Some(error) = validation {
            return Err(GpuError::ProgramCompile {
                label: desc.label.clone(),
                message: error.to_string(),
            });
        }
        Ok(self.insert(built?))
    }

    fn delete(&mut self, handle: NativeHandle) {
        match self.objects.remove(&handle) {
            Some(WgpuObject::Buffer { buffer, .. }) => buffer.destroy(),
            Some(WgpuObject::Texture { texture, .. }) => texture.destroy(),
            Some(_) => {}
            None => log::warn!("[WgpuBackend::delete] Unknown handle {:?}", handle),
        }
    }

    fn write_buffer(&mut self, handle: NativeHandle, offset: u64, data: &[u8]) -> bool {
        let Some(WgpuObject::Buffer { buffer, size }) = self.objects.get(&handle) else {
            return false;
        };
        let len = data.len() as u64;
        if offset + len > *size
            || offset % wgpu::COPY_BUFFER_ALIGNMENT != 0
            || len % wgpu::COPY_BUFFER_ALIGNMENT != 0
        {
            return false;
        }
        self.queue.write_buffer(buffer, offset, data);
        true
    }

    fn read_buffer(&mut self, handle: NativeHandle, out: &mut [u8]) -> bool {
        let Some(WgpuObject::Buffer { buffer, size }) = self.objects.get(&handle) else {
            return false;
        };
        let len = out.len() as u64;
        if len == 0 || len > *size || len % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return false;
        }

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging Buffer"),
            size: len,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, len);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        match pollster::block_on(rx) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::error!("[WgpuBackend::read_buffer] Map failed: {}", e);
                return false;
            }
            Err(_) => return false,
        }

        {
            let data = slice.get_mapped_range();
            out.copy_from_slice(&data);
        }
        staging.unmap();
        true
    }

    fn begin_frame(&mut self) {
        self.clear_pending = true;
    }

    fn draw(&mut self, submission: &DrawSubmission) -> bool {
        let Some(WgpuObject::RenderProgram {
            bind_group_layout,
            pipelines,
        }) = self.objects.get(&submission.program)
        else {
            return false;
        };
        let Some(pipeline) = pipelines.get(&submission.primitive) else {
            return false;
        };
        let Some(vertex_buffer) = self.buffer(submission.vertex_buffer) else {
            return false;
        };
        let index_buffer = match submission.index_buffer {
            Some(handle) => match self.buffer(handle) {
                Some(buffer) => Some(buffer),
                None => return false,
            },
            None => None,
        };
        let texture_view = match submission.texture {
            Some(handle) => match self.objects.get(&handle) {
                Some(WgpuObject::Texture { view, .. }) => view,
                _ => return false,
            },
            None => &self.white_view,
        };

        let mut uniforms = submission.uniforms.clone();
        uniforms.resize(MAX_UNIFORM_SLOTS, [0.0; 4]);
        let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Draw Uniforms"),
            contents: bytemuck::cast_slice(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Bind Group"),
            layout: bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let load = if self.clear_pending {
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
        } else {
            wgpu::LoadOp::Load
        };

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Draw Encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Organism Draw Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            match index_buffer {
                Some(indices) => {
                    pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..submission.index_count, 0, 0..1);
                }
                None => pass.draw(0..submission.vertex_count, 0..1),
            }
        }
        self.queue.submit(Some(encoder.finish()));
        self.clear_pending = false;
        true
    }

    fn dispatch_feedback(&mut self, pass: &FeedbackPass<'_>) -> bool {
        let Some(WgpuObject::FeedbackProgram {
            bind_group_layout,
            pipeline,
        }) = self.objects.get(&pass.program)
        else {
            return false;
        };

        let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Feedback Uniforms"),
            contents: pass.uniforms,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut buffers = Vec::with_capacity(pass.inputs.len() + pass.outputs.len());
        for handle in pass.inputs.iter().chain(pass.outputs.iter()) {
            match self.buffer(*handle) {
                Some(buffer) => buffers.push(buffer),
                None => return false,
            }
        }

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform_buffer.as_entire_binding(),
        }];
        entries.extend(buffers.iter().enumerate().map(|(i, buffer)| wgpu::BindGroupEntry {
            binding: 1 + i as u32,
            resource: buffer.as_entire_binding(),
        }));

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Feedback Bind Group"),
            layout: bind_group_layout,
            entries: &entries,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Feedback Encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Mutation Feedback Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            let workgroups = (pass.invocations + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE;
            compute_pass.dispatch_workgroups(workgroups.max(1), 1, 1);
        }
        self.queue.submit(Some(encoder.finish()));
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
