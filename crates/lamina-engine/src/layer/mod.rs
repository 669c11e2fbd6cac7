//! Retained scene graph.
//!
//! Layers are records in a [`LayerTree`] arena, addressed by generational
//! [`LayerId`]s. Every layer carries [`LayerProps`] (transform, alpha,
//! visibility, tint) plus one [`LayerKind`]:
//!
//! - [`GroupLayer`]: ordered children, painted in insertion order
//! - [`ImageLayer`]: one textured quad, optionally a region or tiled
//! - [`SurfaceLayer`]: framebuffer-backed texture drawn through a [`Surface`]
//! - [`CanvasLayer`]: CPU [`Canvas`] uploaded on change
//! - [`ImmediateLayer`]: application callback run during traversal
//!
//! Traversal accumulates transform, alpha and tint top-down and hands every
//! leaf's draw request to the batching [`GlContext`](crate::gl::GlContext).

mod canvas;
mod id;
mod image;
mod immediate;
mod props;
mod surface;
mod traverse;
mod tree;

pub use canvas::{Canvas, CanvasLayer};
pub use id::LayerId;
pub use image::{ImageLayer, ImageSource};
pub use immediate::{ImmediateLayer, ImmediateRenderer};
pub use props::LayerProps;
pub use surface::{Surface, SurfaceLayer};
pub use tree::{GroupLayer, LayerKind, LayerNode, LayerTree};
