//! Native drawing interface.
//!
//! `Backend` is the only seam through which native GPU entry points are
//! reached. Batching, clipping and traversal live above it and are shared by
//! every implementation.

use std::any::Any;
use std::fmt;

use crate::error::RenderError;
use crate::paint::Color;

macro_rules! native_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl $name {
            /// Wraps a raw native handle.
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

native_id!(
    /// Native texture handle.
    TextureId
);
native_id!(
    /// Native framebuffer handle.
    FramebufferId
);
native_id!(
    /// Native vertex/index buffer handle.
    BufferId
);

/// What a backend can do beyond the mandatory quad/triangle path.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BackendCaps {
    pub immediate_rendering: bool,
    pub framebuffers: bool,
    /// Largest texture edge in pixels.
    pub max_texture_size: u32,
}

impl Default for BackendCaps {
    fn default() -> Self {
        Self {
            immediate_rendering: true,
            framebuffers: true,
            max_texture_size: 8192,
        }
    }
}

/// Texture sampling filter, chosen once per context.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Linear,
    Nearest,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TextureConfig {
    pub width: u32,
    pub height: u32,
    pub repeat_x: bool,
    pub repeat_y: bool,
    pub filter: FilterMode,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PixelFormat {
    /// Premultiplied RGBA, 8 bits per channel.
    Rgba8,
    /// Premultiplied BGRA, 8 bits per channel.
    Bgra8,
}

impl PixelFormat {
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        4
    }
}

/// Borrowed pixel rows handed over by the asset pipeline.
#[derive(Debug, Copy, Clone)]
pub struct PixelData<'a> {
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl<'a> PixelData<'a> {
    /// Checks that the byte length matches the declared size.
    pub fn validated(
        pixels: &'a [u8],
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, RenderError> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(RenderError::InvalidPixels {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            pixels,
            width,
            height,
            format,
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    Static,
    Dynamic,
    Stream,
}

/// Shader program variants known to every backend.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Program {
    /// Instanced quads: one instance record per quad.
    Quad,
    /// Indexed triangle lists with pre-transformed vertices.
    Tris,
}

/// Scissor rectangle in physical pixels of the bound target (top-left origin).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Scissor {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Scissor {
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Overlap of two scissors; disjoint inputs produce an empty scissor.
    pub fn intersect(self, other: Scissor) -> Scissor {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        Scissor::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }
}

/// One native draw call, issued when a batch flushes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DrawCall {
    Quads { instances: BufferId, count: u32 },
    Triangles {
        vertices: BufferId,
        indices: BufferId,
        index_count: u32,
    },
}

/// Native GPU entry points.
///
/// Handles passed in are always ones this backend returned and has not yet
/// deleted; implementations may treat anything else as a bug.
pub trait Backend: Any {
    fn caps(&self) -> BackendCaps;

    fn create_texture(&mut self, config: &TextureConfig) -> Result<TextureId, RenderError>;
    fn upload_texture(&mut self, texture: TextureId, data: &PixelData<'_>);
    fn delete_texture(&mut self, texture: TextureId);

    fn create_framebuffer(&mut self, texture: TextureId) -> Result<FramebufferId, RenderError>;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);
    /// Makes `framebuffer` the draw target; `width`/`height` are its physical size.
    fn bind_framebuffer(&mut self, framebuffer: FramebufferId, width: u32, height: u32);
    /// Replaces the pixels of the bound target inside the active scissor.
    fn clear(&mut self, color: Color);

    fn create_buffer(&mut self, target: BufferTarget) -> Result<BufferId, RenderError>;
    /// Replaces the buffer's contents with `data`.
    fn buffer_data(
        &mut self,
        buffer: BufferId,
        target: BufferTarget,
        data: &[u8],
        usage: BufferUsage,
    );
    fn delete_buffer(&mut self, buffer: BufferId);

    fn use_program(&mut self, program: Program);
    fn active_texture(&mut self, unit: u32);
    fn bind_texture(&mut self, texture: TextureId);

    /// `None` disables the scissor test.
    fn set_scissor(&mut self, scissor: Option<Scissor>);

    fn draw(&mut self, call: DrawCall);

    /// Pops the oldest pending native error, if any.
    fn take_error(&mut self) -> Option<String>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scissor_intersection_of_disjoint_is_empty() {
        let a = Scissor::new(0, 0, 10, 10);
        let b = Scissor::new(20, 20, 5, 5);
        assert!(a.intersect(b).is_empty());
    }

    #[test]
    fn scissor_intersection_overlap() {
        let a = Scissor::new(0, 0, 10, 10);
        let b = Scissor::new(5, 2, 10, 4);
        assert_eq!(a.intersect(b), Scissor::new(5, 2, 5, 4));
    }

    #[test]
    fn filter_modes_key_sampler_maps() {
        use std::collections::HashSet;

        let modes: HashSet<FilterMode> =
            [FilterMode::Linear, FilterMode::Nearest, FilterMode::default()].into_iter().collect();
        assert_eq!(modes.len(), 2);
    }

    #[test]
    fn pixel_data_length_is_checked() {
        let bytes = [0u8; 12];
        assert!(PixelData::validated(&bytes, 3, 1, PixelFormat::Rgba8).is_ok());
        let err = PixelData::validated(&bytes, 2, 2, PixelFormat::Rgba8).unwrap_err();
        assert_eq!(
            err,
            RenderError::InvalidPixels {
                width: 2,
                height: 2,
                expected: 16,
                actual: 12,
            }
        );
    }
}
