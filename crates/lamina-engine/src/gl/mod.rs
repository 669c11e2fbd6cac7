//! GPU context and batching.
//!
//! Everything between the layer tree and the native API:
//! - `backend`: the native interface and its value types
//! - `buffer`: CPU-staged vertex/index buffers
//! - `shader`: per-program batching and flush rules
//! - `context`: resource lifecycle, clipping, targets and the frame state machine
//! - `recording` / `wgpu`: the two backend implementations

mod backend;
mod buffer;
mod clip;
mod context;
mod resource;
mod shader;

pub mod recording;
pub mod wgpu;

pub use backend::{
    Backend, BackendCaps, BufferId, BufferTarget, BufferUsage, DrawCall, FilterMode,
    FramebufferId, PixelData, PixelFormat, Program, Scissor, TextureConfig, TextureId,
};
pub use buffer::{BufferElement, FloatBuffer, GlBuffer, ShortBuffer};
pub use context::{ContextConfig, GlContext, Orientation};
pub use resource::{Framebuffer, Texture};
pub use shader::{
    FrameStats, MAX_BATCH_VERTICES, QUAD_INSTANCE_FLOATS, TRIS_VERTEX_FLOATS, TexVertex,
};
pub use self::wgpu::{WgpuBackend, SCREEN_FRAMEBUFFER};
