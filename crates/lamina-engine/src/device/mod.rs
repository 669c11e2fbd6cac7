//! GPU device and surface management.
//!
//! [`Gpu`] owns the wgpu instance, adapter, device, queue and the window
//! surface. It builds the [`WgpuBackend`](crate::gl::WgpuBackend) the
//! rendering context records into, and turns each painted frame into a
//! submitted, presented surface texture.

mod gpu;
mod surface;

pub use gpu::{Gpu, GpuFrame, GpuInit, SurfaceErrorAction};
