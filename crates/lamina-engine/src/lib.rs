//! Lamina: a retained-mode 2D layer renderer.
//!
//! Applications build a tree of layers (groups, images, offscreen surfaces,
//! CPU canvases, immediate callbacks) and call [`Graphics::paint_frame`] once
//! per frame. Traversal turns the tree into draw requests that the batching
//! [`gl::GlContext`] merges into as few native draw calls as texture and
//! program changes allow. Native calls go through the [`gl::Backend`] trait:
//! [`gl::WgpuBackend`] for real GPUs, [`gl::recording::RecordingBackend`] for
//! headless inspection.

pub mod coords;
pub mod device;
pub mod error;
pub mod gl;
pub mod graphics;
pub mod layer;
pub mod logging;
pub mod paint;
pub mod time;

pub use error::{Capability, RenderError};
pub use graphics::{Graphics, GraphicsConfig};
