//! Frame driver.
//!
//! [`Graphics`] ties a [`GlContext`] to a [`LayerTree`] rooted at a group
//! layer. Platform glue calls [`Graphics::update_layout`] on resize and
//! [`Graphics::paint_frame`] once per frame; everything in between is
//! application edits to the tree.

use log::{debug, info};

use crate::coords::{Transform, Vec2};
use crate::error::{Capability, RenderError};
use crate::gl::{Backend, ContextConfig, FrameStats, GlContext, PixelData, Texture};
use crate::layer::{
    Canvas, CanvasLayer, GroupLayer, ImageLayer, ImageSource, ImmediateLayer, ImmediateRenderer,
    LayerId, LayerKind, LayerTree, Surface, SurfaceLayer,
};
use crate::paint::Color;

#[derive(Debug, Clone)]
pub struct GraphicsConfig {
    pub context: ContextConfig,
    /// Color the default framebuffer is cleared to every frame.
    pub clear_color: Color,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            context: ContextConfig::default(),
            clear_color: Color::BLACK,
        }
    }
}

pub struct Graphics {
    ctx: GlContext,
    layers: LayerTree,
    root: LayerId,
    clear_color: Color,
}

impl Graphics {
    /// Initializes the context on `backend` and creates an empty root group.
    pub fn new(backend: Box<dyn Backend>, config: GraphicsConfig) -> Result<Self, RenderError> {
        let mut ctx = GlContext::new(backend, config.context);
        ctx.init()?;
        let caps = ctx.caps();
        info!(
            "graphics ready: framebuffers={} immediate={} max_texture={}",
            caps.framebuffers, caps.immediate_rendering, caps.max_texture_size
        );

        let mut layers = LayerTree::new();
        let root = layers.insert(LayerKind::Group(GroupLayer::default()));
        Ok(Self {
            ctx,
            layers,
            root,
            clear_color: config.clear_color,
        })
    }

    #[inline]
    pub fn root(&self) -> LayerId {
        self.root
    }

    #[inline]
    pub fn layers(&self) -> &LayerTree {
        &self.layers
    }

    #[inline]
    pub fn layers_mut(&mut self) -> &mut LayerTree {
        &mut self.layers
    }

    #[inline]
    pub fn context(&self) -> &GlContext {
        &self.ctx
    }

    #[inline]
    pub fn context_mut(&mut self) -> &mut GlContext {
        &mut self.ctx
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    // ── per frame ────────────────────────────────────────────────────────

    /// Resizes the default target, in logical pixels.
    pub fn update_layout(&mut self, width: f32, height: f32) {
        self.ctx.set_size(width, height);
    }

    /// Runs update hooks, then paints the whole tree into the default framebuffer.
    pub fn paint_frame(&mut self, delta_seconds: f32) -> FrameStats {
        self.layers.update_all(delta_seconds);

        self.ctx.begin_frame();
        self.ctx.clear(self.clear_color);
        let root_xf = self.ctx.root_transform();
        self.layers.paint(self.root, &mut self.ctx, &root_xf, 1.0);
        let stats = self.ctx.end_frame();
        self.ctx.check_error("paint_frame");
        stats
    }

    /// Paints the tree into whatever target is bound, for callers that
    /// drive `begin_frame`/`end_frame` themselves.
    pub fn paint(&mut self, root_transform: &Transform, alpha: f32) {
        self.layers.paint(self.root, &mut self.ctx, root_transform, alpha);
    }

    /// Top-most layer under a logical screen point.
    pub fn hit_test(&self, point: Vec2) -> Option<LayerId> {
        self.layers.hit_test(self.root, point)
    }

    // ── factories ────────────────────────────────────────────────────────
    //
    // New layers are detached; add them under `root()` or another group.

    pub fn create_group_layer(&mut self) -> LayerId {
        self.layers.insert(LayerKind::Group(GroupLayer::default()))
    }

    pub fn create_image_layer(&mut self, texture: Texture) -> LayerId {
        self.layers.insert(LayerKind::Image(ImageLayer::new(ImageSource::Ready(texture))))
    }

    /// Image whose texture arrives later through [`Graphics::set_image_result`].
    pub fn create_pending_image_layer(&mut self, placeholder: Option<Texture>) -> LayerId {
        self.layers.insert(LayerKind::Image(ImageLayer::new(ImageSource::Pending { placeholder })))
    }

    /// Framebuffer-backed layer of `width × height` logical pixels.
    pub fn create_surface_layer(
        &mut self,
        width: f32,
        height: f32,
    ) -> Result<LayerId, RenderError> {
        self.ctx.require(Capability::Framebuffers)?;
        let scale = self.ctx.scale_factor();
        let (w, h) = (backing(width, scale), backing(height, scale));
        let texture = self.ctx.create_texture(w, h, false, false)?;
        let framebuffer = self.ctx.create_framebuffer(&texture)?;
        let layer = SurfaceLayer::new(framebuffer, Vec2::new(width, height), scale);
        Ok(self.layers.insert(LayerKind::Surface(layer)))
    }

    /// CPU canvas layer; its texture is refreshed on the next paint after a change.
    pub fn create_canvas_layer(&mut self, width: f32, height: f32) -> Result<LayerId, RenderError> {
        let canvas = Canvas::new(width, height, self.ctx.scale_factor());
        let (w, h) = canvas.pixel_size();
        let texture = self.ctx.create_texture(w, h, false, false)?;
        let layer = CanvasLayer::new(canvas, texture, Vec2::new(width, height));
        Ok(self.layers.insert(LayerKind::Canvas(layer)))
    }

    pub fn create_immediate_layer(
        &mut self,
        renderer: impl ImmediateRenderer + 'static,
    ) -> Result<LayerId, RenderError> {
        self.ctx.require(Capability::ImmediateRendering)?;
        let layer = ImmediateLayer::new(Box::new(renderer), None);
        Ok(self.layers.insert(LayerKind::Immediate(layer)))
    }

    /// Immediate layer scissored to `width × height` in layer space.
    pub fn create_clipped_immediate_layer(
        &mut self,
        width: f32,
        height: f32,
        renderer: impl ImmediateRenderer + 'static,
    ) -> Result<LayerId, RenderError> {
        self.ctx.require(Capability::ImmediateRendering)?;
        let layer = ImmediateLayer::new(Box::new(renderer), Some(Vec2::new(width, height)));
        Ok(self.layers.insert(LayerKind::Immediate(layer)))
    }

    // ── assets and resources ─────────────────────────────────────────────

    pub fn upload_texture(&mut self, data: &PixelData<'_>) -> Result<Texture, RenderError> {
        self.ctx.upload_texture(data)
    }

    /// Hands a finished asset load to an image layer. Stale ids are ignored.
    ///
    /// # Panics
    /// Panics if `id` is live but not an image layer.
    pub fn set_image_result(&mut self, id: LayerId, result: Result<Texture, RenderError>) {
        if !self.layers.contains(id) {
            debug!("dropping image result for stale {id:?}");
            return;
        }
        match self.layers.image_mut(id) {
            Some(image) => image.set_result(result),
            None => panic!("{id:?} is not an image layer"),
        }
    }

    /// Draws into a surface layer's framebuffer.
    ///
    /// # Panics
    /// Panics if `id` is not a live surface layer.
    pub fn draw_surface(&mut self, id: LayerId, draw: impl FnOnce(&mut Surface<'_>)) {
        match self.layers.surface(id) {
            Some(surface) => surface.draw(&mut self.ctx, draw),
            None => panic!("{id:?} is not a live surface layer"),
        }
    }

    /// Destroys a layer and its subtree. The root cannot be destroyed.
    pub fn destroy_layer(&mut self, id: LayerId) -> usize {
        assert_ne!(id, self.root, "the root layer cannot be destroyed");
        self.layers.destroy(id)
    }

    /// Tears everything down and hands the backend back.
    pub fn destroy(self) -> Box<dyn Backend> {
        let Self { ctx, layers, .. } = self;
        drop(layers);
        ctx.destroy()
    }
}

fn backing(logical: f32, scale: f32) -> u32 {
    (logical * scale).ceil().max(1.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::recording::RecordingBackend;

    fn graphics() -> Graphics {
        let backend = Box::new(RecordingBackend::new());
        Graphics::new(backend, GraphicsConfig::default()).expect("graphics")
    }

    #[test]
    fn surface_backing_follows_scale_factor() {
        let config = GraphicsConfig {
            context: ContextConfig {
                scale_factor: 2.0,
                ..ContextConfig::default()
            },
            ..GraphicsConfig::default()
        };
        let mut g = Graphics::new(Box::new(RecordingBackend::new()), config).expect("graphics");
        let id = g.create_surface_layer(10.5, 4.0).expect("surface");
        let texture = g.layers().surface(id).expect("surface").texture().clone();
        assert_eq!((texture.width(), texture.height()), (21, 8));
    }

    #[test]
    #[should_panic(expected = "root layer")]
    fn root_cannot_be_destroyed() {
        let mut g = graphics();
        let root = g.root();
        g.destroy_layer(root);
    }

    #[test]
    fn stale_image_result_is_ignored() {
        let mut g = graphics();
        let id = g.create_pending_image_layer(None);
        g.destroy_layer(id);
        g.set_image_result(id, Err(RenderError::exhausted("texture")));
    }
}
