//! Render pipelines for compiled styles

use std::sync::Arc;

use rustc_hash::FxHashMap;
use strata_style::{CompiledStyle, FrameState, ProgramKind, ShaderProgram, StyleHash};
use wgpu::util::DeviceExt;

use crate::error::GpuError;
use crate::upload::vertex_attributes;

/// A linked program plus the layout of its uniform binding
#[derive(Debug)]
pub struct GpuProgram {
    pub kind: ProgramKind,
    pub pipeline: wgpu::RenderPipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub uniform_size: u64,
}

/// Uniform buffer and bind group for one draw
#[derive(Debug)]
pub struct GpuUniforms {
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl GpuUniforms {
    /// Rewrite the block for a new frame
    pub fn update(&self, queue: &wgpu::Queue, style: &CompiledStyle, frame: &FrameState) {
        queue.write_buffer(&self.buffer, 0, &style.uniform_bytes(frame));
    }
}

type ProgramKey = (StyleHash, ProgramKind, wgpu::TextureFormat);

/// Pipelines keyed by style hash, program kind and target format
#[derive(Debug, Default)]
pub struct GpuProgramCache {
    pipelines: FxHashMap<ProgramKey, Arc<GpuProgram>>,
}

impl GpuProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &mut self,
        device: &wgpu::Device,
        style: &CompiledStyle,
        kind: ProgramKind,
        format: wgpu::TextureFormat,
    ) -> Result<Arc<GpuProgram>, GpuError> {
        let key = (style.hash(), kind, format);
        if let Some(program) = self.pipelines.get(&key) {
            return Ok(Arc::clone(program));
        }

        let source = style.program(kind).ok_or(GpuError::MissingProgram {
            style: style.hash(),
            kind,
        })?;
        let program = Arc::new(create_program(device, style, source, format));
        tracing::debug!(style = %style.hash(), kind = %kind, "created render pipeline");
        self.pipelines.insert(key, Arc::clone(&program));
        Ok(program)
    }

    /// Uniform buffer filled for `frame`, bound for `program`
    pub fn create_uniforms(
        &self,
        device: &wgpu::Device,
        program: &GpuProgram,
        style: &CompiledStyle,
        frame: &FrameState,
    ) -> GpuUniforms {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Style Uniform Buffer"),
            contents: &style.uniform_bytes(frame),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Style Bind Group"),
            layout: &program.bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        GpuUniforms { buffer, bind_group }
    }

    /// Drop every pipeline of `style`
    pub fn invalidate_style(&mut self, style: StyleHash) -> usize {
        let before = self.pipelines.len();
        self.pipelines.retain(|(hash, _, _), _| *hash != style);
        before - self.pipelines.len()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

fn create_program(
    device: &wgpu::Device,
    style: &CompiledStyle,
    source: &ShaderProgram,
    format: wgpu::TextureFormat,
) -> GpuProgram {
    let uniform_size = style.uniforms().byte_size() as u64;
    let label = format!("Style {} {}", style.hash(), source.kind);

    let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("{label} Vertex Shader")),
        source: wgpu::ShaderSource::Wgsl(source.vertex_source.as_str().into()),
    });
    let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("{label} Fragment Shader")),
        source: wgpu::ShaderSource::Wgsl(source.fragment_source.as_str().into()),
    });

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{label} Bind Group Layout")),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(uniform_size),
            },
            count: None,
        }],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{label} Pipeline Layout")),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let layout = style.plan().vertex_layout();
    let attributes = vertex_attributes(&layout);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("{label} Pipeline")),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vertex_module,
            entry_point: Some(ShaderProgram::VERTEX_ENTRY),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: layout.stride_bytes,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            }],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &fragment_module,
            entry_point: Some(ShaderProgram::FRAGMENT_ENTRY),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    GpuProgram {
        kind: source.kind,
        pipeline,
        bind_group_layout,
        uniform_size,
    }
}
