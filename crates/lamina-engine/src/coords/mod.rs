//! Coordinate and geometry types shared by the context and the layer tree.
//!
//! Canonical CPU space:
//! - Logical pixels (DPI-aware)
//! - Origin top-left
//! - +X right, +Y down
//!
//! The root transform maps logical pixels to physical target pixels; the GPU
//! programs convert physical pixels to NDC using a viewport uniform.

mod rect;
mod transform;
mod vec2;

pub use rect::Rect;
pub use transform::Transform;
pub use vec2::Vec2;
