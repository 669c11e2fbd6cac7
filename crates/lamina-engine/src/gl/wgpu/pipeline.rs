//! Pipelines and binding layouts for both programs and the scissored clear.

use bytemuck::{Pod, Zeroable};

use crate::gl::backend::Program;
use crate::gl::shader::{QUAD_INSTANCE_FLOATS, TRIS_VERTEX_FLOATS};

// ── blend ─────────────────────────────────────────────────────────────────

pub(super) fn premul_alpha_blend() -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

/// `constant * 1 + dst * 0`: writes the blend constant over the target.
fn replace_with_constant() -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::Constant,
        dst_factor: wgpu::BlendFactor::Zero,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

// ── viewport uniform ──────────────────────────────────────────────────────

/// Target size in physical pixels, one entry per render pass.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(super) struct ViewportUniform {
    pub size: [f32; 2],
    pub _pad: [f32; 2], // 16-byte alignment
}

pub(super) const VIEWPORT_UNIFORM_SIZE: u64 = std::mem::size_of::<ViewportUniform>() as u64;

// ── static unit quad ──────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(super) struct QuadVertex {
    pub corner: [f32; 2], // 0..1
}

pub(super) const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { corner: [0.0, 0.0] },
    QuadVertex { corner: [1.0, 0.0] },
    QuadVertex { corner: [1.0, 1.0] },
    QuadVertex { corner: [0.0, 1.0] },
];

pub(super) const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

const QUAD_VERTEX_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

const QUAD_INSTANCE_ATTRS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
    1 => Float32x4, // m00 m01 m10 m11
    2 => Float32x2, // tx ty
    3 => Float32x4, // dest rect
    4 => Float32x4, // uv rect
    5 => Float32x4  // tint
];

const TRIS_VERTEX_ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x2, // position
    1 => Float32x2, // uv
    2 => Float32x4  // tint
];

const F32: u64 = std::mem::size_of::<f32>() as u64;

fn vertex_layouts(program: Program) -> Vec<wgpu::VertexBufferLayout<'static>> {
    match program {
        Program::Quad => vec![
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<QuadVertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &QUAD_VERTEX_ATTRS,
            },
            wgpu::VertexBufferLayout {
                array_stride: QUAD_INSTANCE_FLOATS as u64 * F32,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &QUAD_INSTANCE_ATTRS,
            },
        ],
        Program::Tris => vec![wgpu::VertexBufferLayout {
            array_stride: TRIS_VERTEX_FLOATS as u64 * F32,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &TRIS_VERTEX_ATTRS,
        }],
    }
}

// ── layouts ───────────────────────────────────────────────────────────────

/// Group 0: viewport uniform (dynamic offset per pass).
/// Group 1: texture + sampler (one bind group per texture).
pub(super) struct Layouts {
    pub viewport: wgpu::BindGroupLayout,
    pub texture: wgpu::BindGroupLayout,
    pipeline: wgpu::PipelineLayout,
}

impl Layouts {
    pub(super) fn new(device: &wgpu::Device) -> Self {
        let viewport = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lamina viewport bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(VIEWPORT_UNIFORM_SIZE),
                },
                count: None,
            }],
        });

        let texture = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lamina texture bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lamina pipeline layout"),
            bind_group_layouts: &[&viewport, &texture],
            immediate_size: 0,
        });

        Self {
            viewport,
            texture,
            pipeline,
        }
    }
}

pub(super) fn create_pipeline(
    device: &wgpu::Device,
    layouts: &Layouts,
    program: Program,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let (label, source) = match program {
        Program::Quad => ("lamina quad", include_str!("shaders/quad.wgsl")),
        Program::Tris => ("lamina tris", include_str!("shaders/tris.wgsl")),
    };
    log::debug!("building {label} pipeline for {format:?}");

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let buffers = vertex_layouts(program);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layouts.pipeline),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(premul_alpha_blend()),
                write_mask: wgpu::ColorWrites::ALL,
            })],
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
        multiview_mask: None,
        cache: None,
    })
}

/// Pipeline for clears that must respect the scissor. Uses no bind groups.
pub(super) fn create_clear_pipeline(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    log::debug!("building lamina clear pipeline for {format:?}");

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("lamina clear"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shaders/clear.wgsl").into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("lamina clear layout"),
        bind_group_layouts: &[],
        immediate_size: 0,
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("lamina clear"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(replace_with_constant()),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}
