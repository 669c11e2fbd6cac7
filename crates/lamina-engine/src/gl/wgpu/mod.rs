//! wgpu implementation of [`Backend`].
//!
//! wgpu has no immediate-mode GL state, so calls made during a frame are
//! recorded: buffer uploads land in a CPU staging arena and every draw
//! captures the program, bind group, scissor and arena ranges in effect.
//! [`WgpuBackend::encode`] then uploads the arena once and replays the
//! recording as one render pass per framebuffer run.
//!
//! Texture uploads go straight to `Queue::write_texture` and therefore land
//! before any pass of the frame executes.
//!
//! A clear on an untouched pass without a scissor becomes the pass load op.
//! Any other clear is recorded in order and replayed as a scissored
//! full-target triangle that overwrites the covered pixels.

mod pipeline;

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::ops::Range;

use wgpu::util::DeviceExt;

use crate::error::RenderError;
use crate::paint::Color;

use super::backend::{
    Backend, BackendCaps, BufferId, BufferTarget, BufferUsage, DrawCall, FilterMode,
    FramebufferId, PixelData, PixelFormat, Program, Scissor, TextureConfig, TextureId,
};
use pipeline::{Layouts, ViewportUniform, QUAD_INDICES, QUAD_VERTICES, VIEWPORT_UNIFORM_SIZE};

/// Framebuffer id the backend maps to the screen view passed to `encode`.
pub const SCREEN_FRAMEBUFFER: FramebufferId = FramebufferId::new(0);

/// Format of every texture and offscreen target.
const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const MIN_ARENA_BYTES: u64 = 64 * 1024;

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
}

#[derive(Clone)]
enum PassTarget {
    Screen,
    Offscreen(wgpu::TextureView),
}

enum Geometry {
    Quads { instances: Range<u64>, count: u32 },
    Triangles {
        vertices: Range<u64>,
        indices: Range<u64>,
        index_count: u32,
    },
}

struct DrawOp {
    program: Program,
    bind_group: wgpu::BindGroup,
    scissor: Option<Scissor>,
    geometry: Geometry,
}

enum PassOp {
    Draw(DrawOp),
    Clear {
        color: Color,
        scissor: Option<Scissor>,
    },
}

/// One render pass worth of recorded work.
struct Pass {
    target: PassTarget,
    width: u32,
    height: u32,
    clear: Option<Color>,
    ops: Vec<PassOp>,
}

impl Pass {
    fn format(&self, screen: wgpu::TextureFormat) -> wgpu::TextureFormat {
        match self.target {
            PassTarget::Screen => screen,
            PassTarget::Offscreen(_) => TEXTURE_FORMAT,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct SamplerKey {
    repeat_x: bool,
    repeat_y: bool,
    filter: FilterMode,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    screen_format: wgpu::TextureFormat,
    max_texture_size: u32,
    uniform_align: u64,

    layouts: Layouts,
    pipelines: HashMap<(Program, wgpu::TextureFormat), wgpu::RenderPipeline>,
    clear_pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    samplers: HashMap<SamplerKey, wgpu::Sampler>,
    quad_vbo: wgpu::Buffer,
    quad_ibo: wgpu::Buffer,

    next_id: u32,
    textures: HashMap<TextureId, GpuTexture>,
    framebuffers: HashMap<FramebufferId, TextureId>,
    buffers: HashMap<BufferId, Option<Range<u64>>>,

    staging: Vec<u8>,
    arena: Option<wgpu::Buffer>,
    arena_capacity: u64,
    viewport_ubo: Option<wgpu::Buffer>,
    viewport_capacity: usize,
    viewport_bind_group: Option<wgpu::BindGroup>,

    passes: Vec<Pass>,
    program: Option<Program>,
    texture: Option<TextureId>,
    scissor: Option<Scissor>,

    errors: VecDeque<String>,
}

impl WgpuBackend {
    /// `screen_format` is the format of the views later passed to `encode`.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        screen_format: wgpu::TextureFormat,
    ) -> Self {
        let limits = device.limits();
        let layouts = Layouts::new(device);

        let quad_vbo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lamina quad vbo"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let quad_ibo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lamina quad ibo"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            device: device.clone(),
            queue: queue.clone(),
            screen_format,
            max_texture_size: limits.max_texture_dimension_2d,
            uniform_align: u64::from(limits.min_uniform_buffer_offset_alignment)
                .max(VIEWPORT_UNIFORM_SIZE),
            layouts,
            pipelines: HashMap::new(),
            clear_pipelines: HashMap::new(),
            samplers: HashMap::new(),
            quad_vbo,
            quad_ibo,
            next_id: 0,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            buffers: HashMap::new(),
            staging: Vec::new(),
            arena: None,
            arena_capacity: 0,
            viewport_ubo: None,
            viewport_capacity: 0,
            viewport_bind_group: None,
            passes: Vec::new(),
            program: None,
            texture: None,
            scissor: None,
            errors: VecDeque::new(),
        }
    }

    /// Changes the format expected for screen views (after surface reconfiguration).
    pub fn set_screen_format(&mut self, format: wgpu::TextureFormat) {
        self.screen_format = format;
    }

    fn alloc_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn report(&mut self, message: String) {
        log::debug!("wgpu backend: {message}");
        self.errors.push_back(message);
    }

    fn sampler(&mut self, key: SamplerKey) -> wgpu::Sampler {
        let device = &self.device;
        self.samplers
            .entry(key)
            .or_insert_with(|| {
                let address = |repeat: bool| {
                    if repeat { wgpu::AddressMode::Repeat } else { wgpu::AddressMode::ClampToEdge }
                };
                let filter = match key.filter {
                    FilterMode::Linear => wgpu::FilterMode::Linear,
                    FilterMode::Nearest => wgpu::FilterMode::Nearest,
                };
                device.create_sampler(&wgpu::SamplerDescriptor {
                    label: Some("lamina sampler"),
                    address_mode_u: address(key.repeat_x),
                    address_mode_v: address(key.repeat_y),
                    address_mode_w: wgpu::AddressMode::ClampToEdge,
                    mag_filter: filter,
                    min_filter: filter,
                    mipmap_filter: wgpu::MipmapFilterMode::Nearest,
                    ..Default::default()
                })
            })
            .clone()
    }

    // ── encoding ─────────────────────────────────────────────────────────

    /// Uploads the frame's geometry and replays the recording into `encoder`.
    ///
    /// `screen` is the view bound to [`SCREEN_FRAMEBUFFER`], `width`/`height`
    /// its actual size. Bound program, texture and scissor carry over to the
    /// next frame; nothing stays bound as a draw target.
    pub fn encode(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        screen: &wgpu::TextureView,
        width: u32,
        height: u32,
    ) {
        let passes: Vec<Pass> = std::mem::take(&mut self.passes)
            .into_iter()
            .filter(|p| p.clear.is_some() || !p.ops.is_empty())
            .collect();
        if passes.is_empty() {
            self.reset_staging();
            return;
        }

        self.upload_staging();
        self.upload_viewports(&passes);
        self.ensure_pipelines(&passes);

        let Some(viewport_bg) = self.viewport_bind_group.as_ref() else { return };
        let arena = self.arena.as_ref();

        for (index, pass) in passes.iter().enumerate() {
            let view = match &pass.target {
                PassTarget::Screen => screen,
                PassTarget::Offscreen(view) => view,
            };
            let (limit_w, limit_h) = match pass.target {
                PassTarget::Screen => (pass.width.min(width), pass.height.min(height)),
                PassTarget::Offscreen(_) => (pass.width, pass.height),
            };
            let load = match pass.clear {
                Some(c) => wgpu::LoadOp::Clear(to_wgpu_color(c)),
                None => wgpu::LoadOp::Load,
            };
            let full = Scissor::new(0, 0, limit_w, limit_h);

            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lamina pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            let offset = (index as u64 * self.uniform_align) as u32;
            rpass.set_bind_group(0, viewport_bg, &[offset]);

            let format = pass.format(self.screen_format);
            let mut bound_program = None;
            for op in &pass.ops {
                let draw = match op {
                    PassOp::Draw(draw) => draw,
                    PassOp::Clear { color, scissor } => {
                        let scissor = scissor.unwrap_or(full).intersect(full);
                        let Some(pipeline) = self.clear_pipelines.get(&format) else {
                            continue;
                        };
                        if scissor.is_empty() {
                            continue;
                        }
                        rpass.set_scissor_rect(scissor.x, scissor.y, scissor.width, scissor.height);
                        rpass.set_pipeline(pipeline);
                        rpass.set_blend_constant(to_wgpu_color(*color));
                        rpass.draw(0..3, 0..1);
                        // The clear pipeline has its own layout; rebind for the next draw.
                        bound_program = None;
                        rpass.set_bind_group(0, viewport_bg, &[offset]);
                        continue;
                    }
                };
                let scissor = draw.scissor.unwrap_or(full).intersect(full);
                let Some(arena) = arena else { continue };
                if scissor.is_empty() {
                    continue;
                }
                rpass.set_scissor_rect(scissor.x, scissor.y, scissor.width, scissor.height);

                if bound_program != Some(draw.program) {
                    let Some(pipeline) = self.pipelines.get(&(draw.program, format)) else {
                        continue;
                    };
                    rpass.set_pipeline(pipeline);
                    bound_program = Some(draw.program);
                }
                rpass.set_bind_group(1, &draw.bind_group, &[]);

                match &draw.geometry {
                    Geometry::Quads { instances, count } => {
                        rpass.set_vertex_buffer(0, self.quad_vbo.slice(..));
                        rpass.set_vertex_buffer(1, arena.slice(instances.clone()));
                        rpass.set_index_buffer(self.quad_ibo.slice(..), wgpu::IndexFormat::Uint16);
                        rpass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..*count);
                    }
                    Geometry::Triangles { vertices, indices, index_count } => {
                        rpass.set_vertex_buffer(0, arena.slice(vertices.clone()));
                        rpass.set_index_buffer(
                            arena.slice(indices.clone()),
                            wgpu::IndexFormat::Uint16,
                        );
                        rpass.draw_indexed(0..*index_count, 0, 0..1);
                    }
                }
            }
        }

        self.reset_staging();
    }

    fn reset_staging(&mut self) {
        self.staging.clear();
        for range in self.buffers.values_mut() {
            *range = None;
        }
    }

    fn upload_staging(&mut self) {
        // write_buffer needs a 4-byte multiple.
        let padded = self.staging.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize);
        self.staging.resize(padded, 0);
        if self.staging.is_empty() {
            return;
        }

        let required = self.staging.len() as u64;
        if self.arena.is_none() || required > self.arena_capacity {
            let capacity = required.next_power_of_two().max(MIN_ARENA_BYTES);
            log::debug!("growing geometry arena to {capacity} bytes");
            self.arena = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("lamina geometry arena"),
                size: capacity,
                usage: wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::INDEX
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
            self.arena_capacity = capacity;
        }
        if let Some(arena) = self.arena.as_ref() {
            self.queue.write_buffer(arena, 0, &self.staging);
        }
    }

    fn upload_viewports(&mut self, passes: &[Pass]) {
        if self.viewport_ubo.is_none() || passes.len() > self.viewport_capacity {
            let capacity = passes.len().next_power_of_two().max(8);
            let ubo = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("lamina viewport ubo"),
                size: capacity as u64 * self.uniform_align,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("lamina viewport bind group"),
                layout: &self.layouts.viewport,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &ubo,
                        offset: 0,
                        size: wgpu::BufferSize::new(VIEWPORT_UNIFORM_SIZE),
                    }),
                }],
            });
            self.viewport_ubo = Some(ubo);
            self.viewport_bind_group = Some(bind_group);
            self.viewport_capacity = capacity;
        }

        let stride = self.uniform_align as usize;
        let mut bytes = vec![0u8; passes.len() * stride];
        for (i, pass) in passes.iter().enumerate() {
            let uniform = ViewportUniform {
                size: [pass.width.max(1) as f32, pass.height.max(1) as f32],
                _pad: [0.0; 2],
            };
            let start = i * stride;
            bytes[start..start + VIEWPORT_UNIFORM_SIZE as usize]
                .copy_from_slice(bytemuck::bytes_of(&uniform));
        }
        if let Some(ubo) = self.viewport_ubo.as_ref() {
            self.queue.write_buffer(ubo, 0, &bytes);
        }
    }

    fn ensure_pipelines(&mut self, passes: &[Pass]) {
        for pass in passes {
            let format = pass.format(self.screen_format);
            for op in &pass.ops {
                match op {
                    PassOp::Draw(draw) => {
                        let key = (draw.program, format);
                        if !self.pipelines.contains_key(&key) {
                            let pipeline = pipeline::create_pipeline(
                                &self.device,
                                &self.layouts,
                                draw.program,
                                format,
                            );
                            self.pipelines.insert(key, pipeline);
                        }
                    }
                    PassOp::Clear { .. } => {
                        if !self.clear_pipelines.contains_key(&format) {
                            let pipeline = pipeline::create_clear_pipeline(&self.device, format);
                            self.clear_pipelines.insert(format, pipeline);
                        }
                    }
                }
            }
        }
    }
}

fn to_wgpu_color(c: Color) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(c.r),
        g: f64::from(c.g),
        b: f64::from(c.b),
        a: f64::from(c.a),
    }
}

impl Backend for WgpuBackend {
    fn caps(&self) -> BackendCaps {
        BackendCaps {
            immediate_rendering: true,
            framebuffers: true,
            max_texture_size: self.max_texture_size,
        }
    }

    fn create_texture(&mut self, config: &TextureConfig) -> Result<TextureId, RenderError> {
        if config.width == 0
            || config.height == 0
            || config.width > self.max_texture_size
            || config.height > self.max_texture_size
        {
            return Err(RenderError::exhausted("texture"));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("lamina texture"),
            size: wgpu::Extent3d {
                width: config.width,
                height: config.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = self.sampler(SamplerKey {
            repeat_x: config.repeat_x,
            repeat_y: config.repeat_y,
            filter: config.filter,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lamina texture bind group"),
            layout: &self.layouts.texture,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let id = TextureId::new(self.alloc_id());
        self.textures.insert(id, GpuTexture {
            texture,
            view,
            bind_group,
        });
        Ok(id)
    }

    fn upload_texture(&mut self, texture: TextureId, data: &PixelData<'_>) {
        if !self.textures.contains_key(&texture) {
            self.report(format!("upload to unknown {texture:?}"));
            return;
        }
        let gpu = &self.textures[&texture];

        let swizzled;
        let bytes = match data.format {
            PixelFormat::Rgba8 => data.pixels,
            PixelFormat::Bgra8 => {
                swizzled = data
                    .pixels
                    .chunks_exact(4)
                    .flat_map(|p| [p[2], p[1], p[0], p[3]])
                    .collect::<Vec<u8>>();
                &swizzled
            }
        };

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &gpu.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * data.width),
                rows_per_image: Some(data.height),
            },
            wgpu::Extent3d {
                width: data.width,
                height: data.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_none() {
            self.report(format!("delete of unknown {texture:?}"));
        }
        if self.texture == Some(texture) {
            self.texture = None;
        }
    }

    fn create_framebuffer(&mut self, texture: TextureId) -> Result<FramebufferId, RenderError> {
        if !self.textures.contains_key(&texture) {
            self.report(format!("framebuffer for unknown {texture:?}"));
            return Err(RenderError::exhausted("framebuffer"));
        }
        let id = FramebufferId::new(self.alloc_id());
        self.framebuffers.insert(id, texture);
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferId, width: u32, height: u32) {
        let target = if framebuffer == SCREEN_FRAMEBUFFER {
            PassTarget::Screen
        } else {
            let view = self
                .framebuffers
                .get(&framebuffer)
                .and_then(|tex| self.textures.get(tex))
                .map(|gpu| gpu.view.clone());
            match view {
                Some(view) => PassTarget::Offscreen(view),
                None => {
                    self.report(format!("bind of unknown {framebuffer:?}"));
                    return;
                }
            }
        };
        self.passes.push(Pass {
            target,
            width,
            height,
            clear: None,
            ops: Vec::new(),
        });
    }

    fn clear(&mut self, color: Color) {
        let scissor = self.scissor;
        let Some(pass) = self.passes.last_mut() else {
            self.report("clear with no framebuffer bound".to_owned());
            return;
        };
        if scissor.is_none() && pass.ops.is_empty() {
            pass.clear = Some(color);
        } else {
            pass.ops.push(PassOp::Clear { color, scissor });
        }
    }

    fn create_buffer(&mut self, _target: BufferTarget) -> Result<BufferId, RenderError> {
        let id = BufferId::new(self.alloc_id());
        self.buffers.insert(id, None);
        Ok(id)
    }

    fn buffer_data(
        &mut self,
        buffer: BufferId,
        _target: BufferTarget,
        data: &[u8],
        _usage: BufferUsage,
    ) {
        // Vertex and index offsets must be 4-byte aligned.
        let start = self.staging.len().next_multiple_of(4);
        self.staging.resize(start, 0);
        self.staging.extend_from_slice(data);
        let range = start as u64..self.staging.len() as u64;
        match self.buffers.get_mut(&buffer) {
            Some(slot) => *slot = Some(range),
            None => self.report(format!("data for unknown {buffer:?}")),
        }
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    fn use_program(&mut self, program: Program) {
        self.program = Some(program);
    }

    fn active_texture(&mut self, unit: u32) {
        if unit != 0 {
            self.report(format!("texture unit {unit} is not supported"));
        }
    }

    fn bind_texture(&mut self, texture: TextureId) {
        self.texture = Some(texture);
    }

    fn set_scissor(&mut self, scissor: Option<Scissor>) {
        self.scissor = scissor;
    }

    fn draw(&mut self, call: DrawCall) {
        let range = |buffers: &HashMap<BufferId, Option<Range<u64>>>, id: BufferId| {
            buffers.get(&id).cloned().flatten()
        };
        let geometry = match call {
            DrawCall::Quads { instances, count } => range(&self.buffers, instances)
                .map(|instances| Geometry::Quads { instances, count }),
            DrawCall::Triangles {
                vertices,
                indices,
                index_count,
            } => match (range(&self.buffers, vertices), range(&self.buffers, indices)) {
                (Some(vertices), Some(indices)) => Some(Geometry::Triangles {
                    vertices,
                    indices,
                    index_count,
                }),
                _ => None,
            },
        };
        let bind_group = self
            .texture
            .and_then(|id| self.textures.get(&id))
            .map(|gpu| gpu.bind_group.clone());

        let (Some(geometry), Some(bind_group), Some(program)) =
            (geometry, bind_group, self.program)
        else {
            self.report(format!("incomplete state for {call:?}"));
            return;
        };
        let op = DrawOp {
            program,
            bind_group,
            scissor: self.scissor,
            geometry,
        };
        if let Some(pass) = self.passes.last_mut() {
            pass.ops.push(PassOp::Draw(op));
            return;
        }
        self.report("draw with no framebuffer bound".to_owned());
    }

    fn take_error(&mut self) -> Option<String> {
        self.errors.pop_front()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
