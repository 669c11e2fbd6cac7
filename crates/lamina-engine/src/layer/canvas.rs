//! CPU-rasterized drawing surface.
//!
//! A [`Canvas`] owns a premultiplied RGBA image. Drawing happens on the CPU
//! in logical coordinates (scaled to the backing resolution); the owning
//! [`CanvasLayer`] re-uploads the pixels on the next paint after any change.

use image::{Rgba, RgbaImage};

use crate::coords::{Rect, Transform, Vec2};
use crate::gl::{GlContext, PixelData, PixelFormat, Texture};
use crate::paint::Color;

pub struct Canvas {
    image: RgbaImage,
    scale: f32,
    dirty: bool,
}

impl Canvas {
    /// Allocates a transparent canvas of `width × height` logical pixels.
    pub fn new(width: f32, height: f32, scale: f32) -> Self {
        let (w, h) = pixel_size(width, height, scale);
        Self {
            image: RgbaImage::new(w, h),
            scale,
            dirty: true,
        }
    }

    /// Backing size in pixels.
    #[inline]
    pub fn pixel_size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[inline]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Premultiplied pixels, row-major.
    #[inline]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear(&mut self, color: Color) -> &mut Self {
        let px = Rgba(color.to_rgba8());
        for p in self.image.pixels_mut() {
            *p = px;
        }
        self.dirty = true;
        self
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Color) -> &mut Self {
        let r = rect.normalized();
        let (w, h) = self.image.dimensions();
        let max = r.max();
        let x0 = (r.origin.x * self.scale).round().clamp(0.0, w as f32) as u32;
        let y0 = (r.origin.y * self.scale).round().clamp(0.0, h as f32) as u32;
        let x1 = (max.x * self.scale).round().clamp(0.0, w as f32) as u32;
        let y1 = (max.y * self.scale).round().clamp(0.0, h as f32) as u32;

        let src = color.clamped();
        for y in y0..y1 {
            for x in x0..x1 {
                blend(self.image.get_pixel_mut(x, y), src);
            }
        }
        self.dirty = true;
        self
    }

    /// Strokes a segment of `width`, covering pixels whose centers lie within
    /// `width / 2` of it.
    pub fn stroke_line(&mut self, from: Vec2, to: Vec2, width: f32, color: Color) -> &mut Self {
        let s = self.scale;
        let (a, b) = (Vec2::new(from.x * s, from.y * s), Vec2::new(to.x * s, to.y * s));
        let half = (width * s / 2.0).max(0.5);

        let (w, h) = self.image.dimensions();
        let x0 = (a.x.min(b.x) - half).floor().clamp(0.0, w as f32) as u32;
        let y0 = (a.y.min(b.y) - half).floor().clamp(0.0, h as f32) as u32;
        let x1 = (a.x.max(b.x) + half).ceil().clamp(0.0, w as f32) as u32;
        let y1 = (a.y.max(b.y) + half).ceil().clamp(0.0, h as f32) as u32;

        let src = color.clamped();
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                if distance_to_segment(center, a, b) <= half {
                    blend(self.image.get_pixel_mut(x, y), src);
                }
            }
        }
        self.dirty = true;
        self
    }

    /// Composites premultiplied `pixels` with their top-left at `at` (logical).
    ///
    /// The source is copied 1:1 onto backing pixels.
    pub fn draw_image(&mut self, pixels: &RgbaImage, at: Vec2) -> &mut Self {
        let ox = (at.x * self.scale).round() as i64;
        let oy = (at.y * self.scale).round() as i64;
        let (w, h) = self.image.dimensions();

        for (sx, sy, p) in pixels.enumerate_pixels() {
            let (dx, dy) = (ox + i64::from(sx), oy + i64::from(sy));
            if dx < 0 || dy < 0 || dx >= i64::from(w) || dy >= i64::from(h) {
                continue;
            }
            let [r, g, b, a] = p.0;
            let src = Color::from_premul(
                f32::from(r) / 255.0,
                f32::from(g) / 255.0,
                f32::from(b) / 255.0,
                f32::from(a) / 255.0,
            );
            blend(self.image.get_pixel_mut(dx as u32, dy as u32), src);
        }
        self.dirty = true;
        self
    }
}

fn pixel_size(width: f32, height: f32, scale: f32) -> (u32, u32) {
    let px = |v: f32| ((v * scale).ceil().max(1.0)) as u32;
    (px(width), px(height))
}

/// Premultiplied source-over.
fn blend(dst: &mut Rgba<u8>, src: Color) {
    let inv = 1.0 - src.a;
    let [r, g, b, a] = dst.0;
    let mix = |s: f32, d: u8| {
        let v = (s + f32::from(d) / 255.0 * inv) * 255.0 + 0.5;
        v.clamp(0.0, 255.0) as u8
    };
    *dst = Rgba([mix(src.r, r), mix(src.g, g), mix(src.b, b), mix(src.a, a)]);
}

fn distance_to_segment(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len2 = ab.x * ab.x + ab.y * ab.y;
    if len2 == 0.0 {
        return (p - a).length();
    }
    let ap = p - a;
    let t = ((ap.x * ab.x + ap.y * ab.y) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).length()
}

/// Layer presenting a [`Canvas`] through a texture of the same pixel size.
pub struct CanvasLayer {
    canvas: Canvas,
    texture: Texture,
    size: Vec2,
}

impl CanvasLayer {
    pub(crate) fn new(canvas: Canvas, texture: Texture, size: Vec2) -> Self {
        Self {
            canvas,
            texture,
            size,
        }
    }

    #[inline]
    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Any drawing through the returned canvas is uploaded on the next paint.
    #[inline]
    pub fn canvas_mut(&mut self) -> &mut Canvas {
        &mut self.canvas
    }

    #[inline]
    pub fn size(&self) -> Vec2 {
        self.size
    }

    #[inline]
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub(crate) fn paint(&mut self, ctx: &mut GlContext, xf: &Transform, tint: Color) {
        if self.canvas.dirty {
            let (width, height) = self.canvas.pixel_size();
            let data = PixelData {
                pixels: self.canvas.image.as_raw(),
                width,
                height,
                format: PixelFormat::Rgba8,
            };
            ctx.update_texture(&self.texture, &data);
            self.canvas.dirty = false;
        }
        let dest = Rect::from_size(self.size.x, self.size.y);
        ctx.draw_quad(self.texture.id(), xf, dest, Rect::from_size(1.0, 1.0), tint);
    }
}
