//! Color model shared between layers, surfaces and the GPU programs.
//!
//! Colors are linear premultiplied RGBA. Layer tints, surface fill colors and
//! canvas pixels all use the same convention so blending stays consistent
//! across the GPU and CPU paths.

pub mod color;

pub use color::Color;
