use log::warn;

use crate::coords::{Rect, Transform, Vec2};
use crate::error::RenderError;
use crate::gl::{GlContext, Texture};
use crate::paint::Color;

/// Where an image layer's pixels currently come from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Asset still loading; paints the placeholder if there is one.
    Pending { placeholder: Option<Texture> },
    Ready(Texture),
    /// Loading failed; the layer no longer paints.
    Failed,
}

impl ImageSource {
    fn texture(&self) -> Option<&Texture> {
        match self {
            Self::Ready(texture) | Self::Pending { placeholder: Some(texture) } => Some(texture),
            Self::Pending { placeholder: None } | Self::Failed => None,
        }
    }
}

/// Leaf layer drawing one textured quad.
#[derive(Debug, Clone)]
pub struct ImageLayer {
    source: ImageSource,
    width: Option<f32>,
    height: Option<f32>,
    region: Option<Rect>,
    repeat_x: bool,
    repeat_y: bool,
}

impl ImageLayer {
    pub fn new(source: ImageSource) -> Self {
        Self {
            source,
            width: None,
            height: None,
            region: None,
            repeat_x: false,
            repeat_y: false,
        }
    }

    #[inline]
    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn set_source(&mut self, source: ImageSource) -> &mut Self {
        self.source = source;
        self
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self.source, ImageSource::Failed)
    }

    /// Asset handoff: a texture makes the layer ready, an error marks it failed.
    pub fn set_result(&mut self, result: Result<Texture, RenderError>) {
        self.source = match result {
            Ok(texture) => ImageSource::Ready(texture),
            Err(err) => {
                warn!("image layer failed to load: {err}");
                ImageSource::Failed
            }
        };
    }

    /// Explicit width in logical pixels; `None` falls back to the texture.
    pub fn set_width(&mut self, width: Option<f32>) -> &mut Self {
        self.width = width;
        self
    }

    pub fn set_height(&mut self, height: Option<f32>) -> &mut Self {
        self.height = height;
        self
    }

    /// Sub-rectangle of the texture in pixels.
    pub fn set_region(&mut self, region: Option<Rect>) -> &mut Self {
        self.region = region;
        self
    }

    #[inline]
    pub fn region(&self) -> Option<Rect> {
        self.region
    }

    /// Tiles the texture along each axis instead of stretching it.
    ///
    /// The texture must have been created with the matching repeat flag.
    pub fn set_repeat(&mut self, repeat_x: bool, repeat_y: bool) -> &mut Self {
        self.repeat_x = repeat_x;
        self.repeat_y = repeat_y;
        self
    }

    /// Painted size: explicit dimensions, else the region, else the texture.
    pub fn size(&self) -> Option<Vec2> {
        let natural = self.region.map(|r| r.size).or_else(|| {
            self.source.texture().map(|t| Vec2::new(t.width() as f32, t.height() as f32))
        });
        match (self.width, self.height, natural) {
            (Some(w), Some(h), _) => Some(Vec2::new(w, h)),
            (w, h, Some(n)) => Some(Vec2::new(w.unwrap_or(n.x), h.unwrap_or(n.y))),
            _ => None,
        }
    }

    fn uv(&self, texture: &Texture, size: Vec2) -> Rect {
        let (tw, th) = (texture.width() as f32, texture.height() as f32);
        let region = self.region.unwrap_or(Rect::from_size(tw, th));
        let uw = if self.repeat_x { size.x / tw } else { region.size.x / tw };
        let vh = if self.repeat_y { size.y / th } else { region.size.y / th };
        Rect::new(region.origin.x / tw, region.origin.y / th, uw, vh)
    }

    pub(crate) fn paint(&self, ctx: &mut GlContext, xf: &Transform, tint: Color) {
        let Some(texture) = self.source.texture() else {
            return;
        };
        let Some(size) = self.size() else {
            return;
        };
        let uv = self.uv(texture, size);
        ctx.draw_quad(texture.id(), xf, Rect::from_size(size.x, size.y), uv, tint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::recording::RecordingBackend;
    use crate::gl::{ContextConfig, GlContext};

    fn texture(ctx: &mut GlContext, w: u32, h: u32, repeat: bool) -> Texture {
        ctx.create_texture(w, h, repeat, repeat).expect("texture")
    }

    fn ctx() -> GlContext {
        let mut ctx = GlContext::new(Box::new(RecordingBackend::new()), ContextConfig::default());
        ctx.init().expect("init");
        ctx
    }

    #[test]
    fn size_prefers_explicit_then_region_then_texture() {
        let mut ctx = ctx();
        let tex = texture(&mut ctx, 64, 32, false);
        let mut layer = ImageLayer::new(ImageSource::Ready(tex));
        assert_eq!(layer.size(), Some(Vec2::new(64.0, 32.0)));

        layer.set_region(Some(Rect::new(8.0, 8.0, 16.0, 4.0)));
        assert_eq!(layer.size(), Some(Vec2::new(16.0, 4.0)));

        layer.set_width(Some(100.0));
        assert_eq!(layer.size(), Some(Vec2::new(100.0, 4.0)));
    }

    #[test]
    fn pending_without_placeholder_has_no_size() {
        let layer = ImageLayer::new(ImageSource::Pending { placeholder: None });
        assert_eq!(layer.size(), None);
    }

    #[test]
    fn region_maps_to_normalized_uv() {
        let mut ctx = ctx();
        let tex = texture(&mut ctx, 64, 32, false);
        let mut layer = ImageLayer::new(ImageSource::Ready(tex.clone()));
        layer.set_region(Some(Rect::new(16.0, 8.0, 32.0, 16.0)));
        let size = layer.size().expect("size");
        assert_eq!(layer.uv(&tex, size), Rect::new(0.25, 0.25, 0.5, 0.5));
    }

    #[test]
    fn repeat_stretches_uv_past_one() {
        let mut ctx = ctx();
        let tex = texture(&mut ctx, 16, 16, true);
        let mut layer = ImageLayer::new(ImageSource::Ready(tex.clone()));
        layer.set_width(Some(64.0)).set_repeat(true, false);
        let size = layer.size().expect("size");
        assert_eq!(layer.uv(&tex, size), Rect::new(0.0, 0.0, 4.0, 1.0));
    }

    #[test]
    fn failed_result_stops_painting() {
        let mut layer = ImageLayer::new(ImageSource::Pending { placeholder: None });
        layer.set_result(Err(RenderError::exhausted("texture")));
        assert!(layer.is_failed());
        assert_eq!(layer.size(), None);
    }
}
