//! Geometry batching for the two GPU programs.
//!
//! Each shader owns the buffers its program reads. The [`Batcher`] routes
//! draw requests to the right shader and decides when to flush:
//!
//! - a request for a different program or texture flushes first
//! - a request that does not fit the remaining capacity flushes first
//! - a request larger than the whole buffer flushes, then expands the buffer
//!
//! Contiguous requests that share state are merged; nothing is ever
//! reordered across a state change, which keeps alpha blending correct.

use crate::coords::{Rect, Transform, Vec2};
use crate::error::RenderError;
use crate::paint::Color;

use super::backend::{Backend, BufferTarget, BufferUsage, DrawCall, Program, TextureId};
use super::buffer::{FloatBuffer, ShortBuffer};

/// Floats per quad instance: transform (6), dest rect (4), uv rect (4), tint (4).
pub const QUAD_INSTANCE_FLOATS: usize = 18;
/// Floats per triangle vertex: position (2), uv (2), tint (4).
pub const TRIS_VERTEX_FLOATS: usize = 8;
/// Vertices addressable by `u16` indices within one batch.
pub const MAX_BATCH_VERTICES: usize = u16::MAX as usize + 1;

/// Per-frame counters, reset by `GlContext::begin_frame`.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub quads: u32,
    pub triangles: u32,
    pub texture_binds: u32,
    pub flushes: u32,
}

/// Textured vertex in layer space.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct TexVertex {
    pub pos: Vec2,
    pub uv: Vec2,
}

impl TexVertex {
    #[inline]
    pub const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self {
            pos: Vec2::new(x, y),
            uv: Vec2::new(u, v),
        }
    }
}

/// Common contract of the batching shaders.
pub(crate) trait GlShader {
    fn program(&self) -> Program;

    fn is_empty(&self) -> bool;

    /// Uploads pending geometry and issues one draw call.
    ///
    /// Returns `None` without touching the backend when nothing is pending.
    fn flush(&mut self, backend: &mut dyn Backend) -> Option<DrawCall>;

    fn destroy(self, backend: &mut dyn Backend);
}

// ── quad ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct QuadShader {
    instances: FloatBuffer,
}

impl QuadShader {
    pub(crate) fn new(backend: &mut dyn Backend, quads: usize) -> Result<Self, RenderError> {
        Ok(Self {
            instances: FloatBuffer::new(
                backend,
                BufferTarget::Vertex,
                quads * QUAD_INSTANCE_FLOATS,
            )?,
        })
    }

    #[inline]
    pub(crate) fn can_accept(&self, quads: usize) -> bool {
        self.instances.remaining() >= quads * QUAD_INSTANCE_FLOATS
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.instances.capacity() / QUAD_INSTANCE_FLOATS
    }

    pub(crate) fn expand(&mut self, quads: usize) {
        self.instances.expand(quads * QUAD_INSTANCE_FLOATS);
    }

    #[inline]
    pub(crate) fn pending_quads(&self) -> usize {
        self.instances.position() / QUAD_INSTANCE_FLOATS
    }

    pub(crate) fn add_quad(&mut self, xf: &Transform, dest: Rect, uv: Rect, tint: Color) {
        self.instances.add_transform(xf);
        self.instances.add_vec4([dest.origin.x, dest.origin.y, dest.size.x, dest.size.y]);
        self.instances.add_vec4([uv.origin.x, uv.origin.y, uv.size.x, uv.size.y]);
        self.instances.add_vec4(tint.to_array());
    }
}

impl GlShader for QuadShader {
    fn program(&self) -> Program {
        Program::Quad
    }

    fn is_empty(&self) -> bool {
        self.instances.position() == 0
    }

    fn flush(&mut self, backend: &mut dyn Backend) -> Option<DrawCall> {
        if self.is_empty() {
            return None;
        }
        let floats = self.instances.send(backend, BufferUsage::Stream);
        let call = DrawCall::Quads {
            instances: self.instances.id(),
            count: (floats / QUAD_INSTANCE_FLOATS) as u32,
        };
        backend.draw(call);
        Some(call)
    }

    fn destroy(self, backend: &mut dyn Backend) {
        self.instances.destroy(backend);
    }
}

// ── indexed triangles ─────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct TrisShader {
    vertices: FloatBuffer,
    elements: ShortBuffer,
}

impl TrisShader {
    pub(crate) fn new(
        backend: &mut dyn Backend,
        vertices: usize,
        indices: usize,
    ) -> Result<Self, RenderError> {
        Ok(Self {
            vertices: FloatBuffer::new(
                backend,
                BufferTarget::Vertex,
                vertices * TRIS_VERTEX_FLOATS,
            )?,
            elements: ShortBuffer::new(backend, BufferTarget::Index, indices)?,
        })
    }

    #[inline]
    fn vertex_count(&self) -> usize {
        self.vertices.position() / TRIS_VERTEX_FLOATS
    }

    pub(crate) fn can_accept(&self, vertices: usize, indices: usize) -> bool {
        self.vertices.remaining() >= vertices * TRIS_VERTEX_FLOATS
            && self.elements.remaining() >= indices
            && self.vertex_count() + vertices <= MAX_BATCH_VERTICES
    }

    pub(crate) fn expand(&mut self, vertices: usize, indices: usize) {
        self.vertices.expand(vertices * TRIS_VERTEX_FLOATS);
        self.elements.expand(indices);
    }

    /// Appends a transformed triangle list. Indices are relative to `verts`.
    pub(crate) fn add_triangles(
        &mut self,
        xf: &Transform,
        verts: &[TexVertex],
        indices: &[u16],
        tint: Color,
    ) {
        // The batch-wide vertex cap keeps the rebased index within u16.
        let base = self.vertex_count() as u16;
        let tint = tint.to_array();

        for v in verts {
            let p = xf.apply(v.pos);
            self.vertices.add_vec2(p.x, p.y);
            self.vertices.add_vec2(v.uv.x, v.uv.y);
            self.vertices.add_vec4(tint);
        }
        for &i in indices {
            self.elements.add(base + i);
        }
    }
}

impl GlShader for TrisShader {
    fn program(&self) -> Program {
        Program::Tris
    }

    fn is_empty(&self) -> bool {
        self.elements.position() == 0
    }

    fn flush(&mut self, backend: &mut dyn Backend) -> Option<DrawCall> {
        if self.is_empty() {
            self.vertices.reset();
            return None;
        }
        self.vertices.send(backend, BufferUsage::Stream);
        let index_count = self.elements.send(backend, BufferUsage::Stream) as u32;
        let call = DrawCall::Triangles {
            vertices: self.vertices.id(),
            indices: self.elements.id(),
            index_count,
        };
        backend.draw(call);
        Some(call)
    }

    fn destroy(self, backend: &mut dyn Backend) {
        self.vertices.destroy(backend);
        self.elements.destroy(backend);
    }
}

// ── batcher ───────────────────────────────────────────────────────────────

/// Geometry a request is about to append.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Need {
    Quads(usize),
    Tris { vertices: usize, indices: usize },
}

impl Need {
    fn program(self) -> Program {
        match self {
            Need::Quads(_) => Program::Quad,
            Need::Tris { .. } => Program::Tris,
        }
    }
}

/// Batch state machine shared by both shaders.
///
/// `program` and `texture` mirror what is bound on the backend. All pending
/// geometry was requested under exactly that pair.
#[derive(Debug)]
pub(crate) struct Batcher {
    quad: QuadShader,
    tris: TrisShader,
    program: Option<Program>,
    texture: Option<TextureId>,
    stats: FrameStats,
}

impl Batcher {
    pub(crate) fn new(quad: QuadShader, tris: TrisShader) -> Self {
        Self {
            quad,
            tris,
            program: None,
            texture: None,
            stats: FrameStats::default(),
        }
    }

    #[inline]
    pub(crate) fn stats(&self) -> FrameStats {
        self.stats
    }

    pub(crate) fn reset_stats(&mut self) {
        self.stats = FrameStats::default();
    }

    #[inline]
    pub(crate) fn bound_texture(&self) -> Option<TextureId> {
        self.texture
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.quad.is_empty() || !self.tris.is_empty()
    }

    /// Forgets the mirrored backend bindings so the next request rebinds.
    ///
    /// Only valid with nothing pending.
    pub(crate) fn invalidate(&mut self) {
        debug_assert!(!self.has_pending(), "invalidate with pending geometry");
        self.program = None;
        self.texture = None;
    }

    /// Drops the mirrored binding of a texture that is about to be deleted.
    pub(crate) fn forget_texture(&mut self, texture: TextureId) {
        debug_assert!(!self.has_pending(), "forget_texture with pending geometry");
        if self.texture == Some(texture) {
            self.texture = None;
        }
    }

    fn fits(&self, need: Need) -> bool {
        match need {
            Need::Quads(n) => self.quad.can_accept(n),
            Need::Tris { vertices, indices } => self.tris.can_accept(vertices, indices),
        }
    }

    /// Readies the batch for `need` under (`program(need)`, `texture`).
    pub(crate) fn prepare(&mut self, backend: &mut dyn Backend, texture: TextureId, need: Need) {
        let program = need.program();
        let same_state = self.program == Some(program) && self.texture == Some(texture);

        if !same_state || !self.fits(need) {
            self.flush(backend);
        }

        if !self.fits(need) {
            match need {
                Need::Quads(n) => {
                    let target = (self.quad.capacity() * 2).max(n);
                    self.quad.expand(target);
                }
                Need::Tris { vertices, indices } => {
                    assert!(
                        vertices <= MAX_BATCH_VERTICES,
                        "triangle request of {vertices} vertices exceeds u16 indexing"
                    );
                    self.tris.expand(vertices, indices);
                }
            }
        }

        if self.program != Some(program) {
            backend.use_program(program);
            self.program = Some(program);
        }
        self.bind_texture(backend, texture);
    }

    /// Binds `texture`, flushing first if it differs from the bound one.
    pub(crate) fn bind_texture(&mut self, backend: &mut dyn Backend, texture: TextureId) {
        if self.texture == Some(texture) {
            return;
        }
        self.flush(backend);
        backend.bind_texture(texture);
        self.texture = Some(texture);
        self.stats.texture_binds += 1;
    }

    pub(crate) fn add_quad(&mut self, xf: &Transform, dest: Rect, uv: Rect, tint: Color) {
        self.quad.add_quad(xf, dest, uv, tint);
        self.stats.quads += 1;
    }

    pub(crate) fn add_triangles(
        &mut self,
        xf: &Transform,
        verts: &[TexVertex],
        indices: &[u16],
        tint: Color,
    ) {
        self.tris.add_triangles(xf, verts, indices, tint);
        self.stats.triangles += (indices.len() / 3) as u32;
    }

    /// Issues the pending draw call, if any.
    pub(crate) fn flush(&mut self, backend: &mut dyn Backend) {
        let call = match self.program {
            Some(Program::Quad) => self.quad.flush(backend),
            Some(Program::Tris) => self.tris.flush(backend),
            None => None,
        };
        if let Some(call) = call {
            self.stats.flushes += 1;
            self.stats.draw_calls += 1;
            log::trace!("flush {call:?}");
        }
    }

    pub(crate) fn destroy(self, backend: &mut dyn Backend) {
        self.quad.destroy(backend);
        self.tris.destroy(backend);
    }

    #[cfg(test)]
    pub(crate) fn pending_quads(&self) -> usize {
        self.quad.pending_quads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::recording::{Command, RecordingBackend};

    fn batcher(backend: &mut RecordingBackend, quads: usize) -> Batcher {
        let quad = QuadShader::new(backend, quads).unwrap();
        let tris = TrisShader::new(backend, 16, 24).unwrap();
        Batcher::new(quad, tris)
    }

    fn quad(b: &mut Batcher, backend: &mut RecordingBackend, tex: u32) {
        b.prepare(backend, TextureId::new(tex), Need::Quads(1));
        let unit = Rect::from_size(1.0, 1.0);
        b.add_quad(&Transform::IDENTITY, unit, unit, Color::WHITE);
    }

    #[test]
    fn same_texture_requests_merge() {
        let mut backend = RecordingBackend::new();
        let mut b = batcher(&mut backend, 8);
        quad(&mut b, &mut backend, 100);
        quad(&mut b, &mut backend, 100);
        quad(&mut b, &mut backend, 100);
        b.flush(&mut backend);

        assert_eq!(backend.draws().len(), 1);
        assert_eq!(backend.draws()[0].primitive_count(), 3);
    }

    #[test]
    fn texture_changes_are_never_reordered() {
        let mut backend = RecordingBackend::new();
        let mut b = batcher(&mut backend, 8);
        quad(&mut b, &mut backend, 1); // A
        quad(&mut b, &mut backend, 2); // B
        quad(&mut b, &mut backend, 1); // C
        b.flush(&mut backend);

        let textures: Vec<_> = backend.draws().iter().map(|d| d.texture.unwrap().raw()).collect();
        assert_eq!(textures, vec![1, 2, 1]);
        assert!(backend.draws().iter().all(|d| d.primitive_count() == 1));
    }

    #[test]
    fn program_switch_flushes() {
        let mut backend = RecordingBackend::new();
        let mut b = batcher(&mut backend, 8);
        let tex = TextureId::new(9);

        quad(&mut b, &mut backend, 9);
        b.prepare(&mut backend, tex, Need::Tris {
            vertices: 3,
            indices: 3,
        });
        b.add_triangles(
            &Transform::IDENTITY,
            &[TexVertex::default(); 3],
            &[0, 1, 2],
            Color::WHITE,
        );
        b.flush(&mut backend);

        let programs: Vec<_> = backend.draws().iter().map(|d| d.program.unwrap()).collect();
        assert_eq!(programs, vec![Program::Quad, Program::Tris]);
    }

    #[test]
    fn full_buffer_flushes_and_keeps_binding() {
        let mut backend = RecordingBackend::new();
        let mut b = batcher(&mut backend, 2);
        for _ in 0..5 {
            quad(&mut b, &mut backend, 4);
        }
        b.flush(&mut backend);

        let counts: Vec<_> = backend.draws().iter().map(|d| d.primitive_count()).collect();
        assert_eq!(counts, vec![2, 2, 1]);
        let binds = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::BindTexture(_)))
            .count();
        assert_eq!(binds, 1);
    }

    #[test]
    fn oversized_triangle_request_expands() {
        let mut backend = RecordingBackend::new();
        let mut b = batcher(&mut backend, 2);
        let verts = vec![TexVertex::default(); 40];
        let indices: Vec<u16> = (0..60).map(|i| (i % 40) as u16).collect();

        b.prepare(&mut backend, TextureId::new(1), Need::Tris {
            vertices: 40,
            indices: 60,
        });
        b.add_triangles(&Transform::IDENTITY, &verts, &indices, Color::WHITE);
        b.flush(&mut backend);

        let draw = &backend.draws()[0];
        assert!(matches!(draw.call, DrawCall::Triangles { index_count: 60, .. }));
        assert_eq!(draw.vertices.len(), 40 * TRIS_VERTEX_FLOATS);
    }

    #[test]
    fn second_triangle_batch_rebases_indices() {
        let mut backend = RecordingBackend::new();
        let mut b = batcher(&mut backend, 2);
        let tex = TextureId::new(1);
        let verts = [TexVertex::default(); 3];

        for _ in 0..2 {
            b.prepare(&mut backend, tex, Need::Tris {
                vertices: 3,
                indices: 3,
            });
            b.add_triangles(&Transform::IDENTITY, &verts, &[0, 1, 2], Color::WHITE);
        }
        b.flush(&mut backend);

        assert_eq!(backend.draws()[0].indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn flush_with_nothing_pending_is_silent() {
        let mut backend = RecordingBackend::new();
        let mut b = batcher(&mut backend, 2);
        b.flush(&mut backend);
        assert!(backend.draws().is_empty());
        assert_eq!(b.stats().flushes, 0);
        assert_eq!(b.pending_quads(), 0);
    }
}
