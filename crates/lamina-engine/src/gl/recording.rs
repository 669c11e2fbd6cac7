//! Headless backend that records the native call stream.
//!
//! Every call becomes a [`Command`]. Draw calls are additionally resolved
//! into [`DrawRecord`]s that capture the state in effect at the time (program,
//! texture, scissor, target) together with a copy of the uploaded geometry, so
//! tests and tools can inspect exactly what a frame would have drawn.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{Capability, RenderError};
use crate::paint::Color;

use super::backend::{
    Backend, BackendCaps, BufferId, BufferTarget, BufferUsage, DrawCall, FramebufferId, PixelData,
    Program, Scissor, TextureConfig, TextureId,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateTexture {
        id: TextureId,
        config: TextureConfig,
    },
    UploadTexture {
        id: TextureId,
        width: u32,
        height: u32,
    },
    DeleteTexture(TextureId),
    CreateFramebuffer {
        id: FramebufferId,
        texture: TextureId,
    },
    DeleteFramebuffer(FramebufferId),
    BindFramebuffer {
        id: FramebufferId,
        width: u32,
        height: u32,
    },
    Clear {
        color: Color,
        scissor: Option<Scissor>,
    },
    CreateBuffer { id: BufferId, target: BufferTarget },
    BufferData {
        id: BufferId,
        target: BufferTarget,
        len: usize,
        usage: BufferUsage,
    },
    DeleteBuffer(BufferId),
    UseProgram(Program),
    ActiveTexture(u32),
    BindTexture(TextureId),
    SetScissor(Option<Scissor>),
    Draw(DrawCall),
}

/// A draw call with the state it was issued under.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub call: DrawCall,
    pub program: Option<Program>,
    pub texture: Option<TextureId>,
    pub scissor: Option<Scissor>,
    pub framebuffer: Option<FramebufferId>,
    /// Float contents of the vertex/instance buffer at draw time.
    pub vertices: Vec<f32>,
    /// Index contents at draw time (triangle draws only).
    pub indices: Vec<u16>,
}

impl DrawRecord {
    /// Quad instances or indexed vertices covered by this call.
    pub fn primitive_count(&self) -> u32 {
        match self.call {
            DrawCall::Quads { count, .. } => count,
            DrawCall::Triangles { index_count, .. } => index_count / 3,
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    caps: BackendCaps,
    texture_budget: Option<usize>,
    next_id: u32,

    commands: Vec<Command>,
    draws: Vec<DrawRecord>,
    errors: VecDeque<String>,

    live_textures: HashSet<TextureId>,
    live_framebuffers: HashSet<FramebufferId>,
    buffer_contents: HashMap<BufferId, Vec<u8>>,

    program: Option<Program>,
    texture: Option<TextureId>,
    scissor: Option<Scissor>,
    framebuffer: Option<FramebufferId>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caps(caps: BackendCaps) -> Self {
        Self { caps, ..Self::default() }
    }

    /// Caps the number of live textures; creation beyond it reports exhaustion.
    pub fn with_texture_budget(mut self, budget: usize) -> Self {
        self.texture_budget = Some(budget);
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn live_textures(&self) -> usize {
        self.live_textures.len()
    }

    pub fn is_texture_live(&self, id: TextureId) -> bool {
        self.live_textures.contains(&id)
    }

    /// Forgets recorded commands and draws; live resources are kept.
    pub fn clear_log(&mut self) {
        self.commands.clear();
        self.draws.clear();
    }

    /// Queues a native error to be reported by the next `take_error`.
    pub fn inject_error(&mut self, message: impl Into<String>) {
        self.errors.push_back(message.into());
    }

    fn alloc_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn contents<T: bytemuck::Pod>(&self, id: BufferId) -> Vec<T> {
        self.buffer_contents
            .get(&id)
            .map(|bytes| bytemuck::pod_collect_to_vec::<u8, T>(bytes.as_slice()))
            .unwrap_or_default()
    }
}

impl Backend for RecordingBackend {
    fn caps(&self) -> BackendCaps {
        self.caps
    }

    fn create_texture(&mut self, config: &TextureConfig) -> Result<TextureId, RenderError> {
        let oversized =
            config.width > self.caps.max_texture_size || config.height > self.caps.max_texture_size;
        let over_budget = self
            .texture_budget
            .is_some_and(|budget| self.live_textures.len() >= budget);
        if oversized || over_budget {
            return Err(RenderError::exhausted("texture"));
        }

        let id = TextureId::new(self.alloc_id());
        self.live_textures.insert(id);
        self.commands.push(Command::CreateTexture {
            id,
            config: *config,
        });
        Ok(id)
    }

    fn upload_texture(&mut self, texture: TextureId, data: &PixelData<'_>) {
        assert!(self.live_textures.contains(&texture), "upload to dead {texture:?}");
        self.commands.push(Command::UploadTexture {
            id: texture,
            width: data.width,
            height: data.height,
        });
    }

    fn delete_texture(&mut self, texture: TextureId) {
        assert!(self.live_textures.remove(&texture), "{texture:?} deleted twice");
        self.commands.push(Command::DeleteTexture(texture));
    }

    fn create_framebuffer(&mut self, texture: TextureId) -> Result<FramebufferId, RenderError> {
        if !self.caps.framebuffers {
            return Err(RenderError::Unsupported(Capability::Framebuffers));
        }
        let id = FramebufferId::new(self.alloc_id());
        self.live_framebuffers.insert(id);
        self.commands.push(Command::CreateFramebuffer { id, texture });
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        assert!(self.live_framebuffers.remove(&framebuffer), "{framebuffer:?} deleted twice");
        self.commands.push(Command::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferId, width: u32, height: u32) {
        self.framebuffer = Some(framebuffer);
        self.commands.push(Command::BindFramebuffer {
            id: framebuffer,
            width,
            height,
        });
    }

    fn clear(&mut self, color: Color) {
        self.commands.push(Command::Clear {
            color,
            scissor: self.scissor,
        });
    }

    fn create_buffer(&mut self, target: BufferTarget) -> Result<BufferId, RenderError> {
        let id = BufferId::new(self.alloc_id());
        self.buffer_contents.insert(id, Vec::new());
        self.commands.push(Command::CreateBuffer { id, target });
        Ok(id)
    }

    fn buffer_data(
        &mut self,
        buffer: BufferId,
        target: BufferTarget,
        data: &[u8],
        usage: BufferUsage,
    ) {
        self.buffer_contents.insert(buffer, data.to_vec());
        self.commands.push(Command::BufferData {
            id: buffer,
            target,
            len: data.len(),
            usage,
        });
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffer_contents.remove(&buffer);
        self.commands.push(Command::DeleteBuffer(buffer));
    }

    fn use_program(&mut self, program: Program) {
        self.program = Some(program);
        self.commands.push(Command::UseProgram(program));
    }

    fn active_texture(&mut self, unit: u32) {
        self.commands.push(Command::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, texture: TextureId) {
        self.texture = Some(texture);
        self.commands.push(Command::BindTexture(texture));
    }

    fn set_scissor(&mut self, scissor: Option<Scissor>) {
        self.scissor = scissor;
        self.commands.push(Command::SetScissor(scissor));
    }

    fn draw(&mut self, call: DrawCall) {
        let (vertices, indices) = match call {
            DrawCall::Quads { instances, .. } => (self.contents(instances), Vec::new()),
            DrawCall::Triangles { vertices, indices, .. } => {
                (self.contents(vertices), self.contents(indices))
            }
        };
        self.draws.push(DrawRecord {
            call,
            program: self.program,
            texture: self.texture,
            scissor: self.scissor,
            framebuffer: self.framebuffer,
            vertices,
            indices,
        });
        self.commands.push(Command::Draw(call));
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
