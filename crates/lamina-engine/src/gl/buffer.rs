//! CPU-side staging for vertex and index data.
//!
//! A `GlBuffer` pairs a fixed-capacity array with a native buffer handle.
//! Writes advance a cursor; `send` uploads everything written since the last
//! send and rewinds the cursor so the same storage is reused every frame.
//!
//! Writing past capacity is a bug in the caller and panics on the slice
//! index. Callers check `remaining()` and `expand()` up front.

use bytemuck::Pod;

use crate::coords::Transform;
use crate::error::RenderError;

use super::backend::{Backend, BufferId, BufferTarget, BufferUsage};

/// Scalar types a `GlBuffer` can hold.
pub trait BufferElement: Pod + Default {
    const NAME: &'static str;
}

impl BufferElement for f32 {
    const NAME: &'static str = "float buffer";
}

impl BufferElement for u16 {
    const NAME: &'static str = "short buffer";
}

#[derive(Debug)]
pub struct GlBuffer<T: BufferElement> {
    id: BufferId,
    target: BufferTarget,
    data: Vec<T>,
    position: usize,
}

/// Vertex attribute storage.
pub type FloatBuffer = GlBuffer<f32>;
/// Element index storage.
pub type ShortBuffer = GlBuffer<u16>;

impl<T: BufferElement> GlBuffer<T> {
    /// Allocates the native buffer and `capacity` zeroed elements.
    pub fn new(
        backend: &mut dyn Backend,
        target: BufferTarget,
        capacity: usize,
    ) -> Result<Self, RenderError> {
        let id = backend.create_buffer(target)?;
        log::debug!("created {} {id:?} ({capacity} elements)", T::NAME);
        Ok(Self {
            id,
            target,
            data: vec![T::default(); capacity],
            position: 0,
        })
    }

    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Grows storage to at least `capacity` elements. Never shrinks.
    pub fn expand(&mut self, capacity: usize) {
        if capacity > self.data.len() {
            log::debug!("expanding {} {:?}: {} -> {capacity}", T::NAME, self.id, self.data.len());
            self.data.resize(capacity, T::default());
        }
    }

    #[inline]
    pub fn add(&mut self, value: T) {
        self.data[self.position] = value;
        self.position += 1;
    }

    #[inline]
    pub fn add_slice(&mut self, values: &[T]) {
        let end = self.position + values.len();
        self.data[self.position..end].copy_from_slice(values);
        self.position = end;
    }

    /// Elements written since the last send.
    #[inline]
    pub fn pending(&self) -> &[T] {
        &self.data[..self.position]
    }

    /// Uploads `[0, position)`, rewinds, and returns how many elements went out.
    pub fn send(&mut self, backend: &mut dyn Backend, usage: BufferUsage) -> usize {
        let sent = self.position;
        backend.buffer_data(
            self.id,
            self.target,
            bytemuck::cast_slice(&self.data[..sent]),
            usage,
        );
        self.position = 0;
        sent
    }

    /// Drops pending elements without uploading them.
    #[inline]
    pub fn reset(&mut self) {
        self.position = 0;
    }

    pub fn destroy(self, backend: &mut dyn Backend) {
        log::debug!("deleting {} {:?}", T::NAME, self.id);
        backend.delete_buffer(self.id);
    }
}

impl FloatBuffer {
    #[inline]
    pub fn add_vec2(&mut self, x: f32, y: f32) {
        self.add_slice(&[x, y]);
    }

    #[inline]
    pub fn add_vec4(&mut self, v: [f32; 4]) {
        self.add_slice(&v);
    }

    #[inline]
    pub fn add_transform(&mut self, t: &Transform) {
        self.add_slice(&t.to_array());
    }
}
