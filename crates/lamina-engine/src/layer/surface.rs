//! Free-form drawing onto a GPU target.
//!
//! [`Surface`] is handed to surface-layer callbacks (drawing into the layer's
//! framebuffer) and to immediate-layer renderers (drawing straight into the
//! current frame). It keeps a transform/fill stack like a 2D canvas and
//! forwards every primitive to the batching context.

use crate::coords::{Rect, Transform, Vec2};
use crate::gl::{Framebuffer, GlContext, TexVertex, Texture};
use crate::paint::Color;

#[derive(Debug, Copy, Clone)]
struct SurfaceState {
    transform: Transform,
    fill: Color,
    alpha: f32,
}

pub struct Surface<'a> {
    ctx: &'a mut GlContext,
    /// Accumulated tint and alpha of the layers above, premultiplied.
    inherited: Color,
    state: SurfaceState,
    saved: Vec<SurfaceState>,
    size: Vec2,
}

impl<'a> Surface<'a> {
    /// `base` maps surface coordinates to physical pixels of the bound target;
    /// `inherited` multiplies every draw.
    pub(crate) fn new(
        ctx: &'a mut GlContext,
        base: Transform,
        inherited: Color,
        size: Vec2,
    ) -> Self {
        Self {
            ctx,
            inherited,
            state: SurfaceState {
                transform: base,
                fill: Color::WHITE,
                alpha: 1.0,
            },
            saved: Vec::new(),
            size,
        }
    }

    /// Logical size of the drawable area (zero for unclipped immediate layers).
    #[inline]
    pub fn size(&self) -> Vec2 {
        self.size
    }

    #[inline]
    pub fn current_transform(&self) -> Transform {
        self.state.transform
    }

    /// Replaces every pixel inside the active clip, ignoring the transform.
    pub fn clear(&mut self, color: Color) -> &mut Self {
        self.ctx.clear(color);
        self
    }

    // ── state stack ──────────────────────────────────────────────────────

    pub fn save(&mut self) -> &mut Self {
        self.saved.push(self.state);
        self
    }

    /// # Panics
    /// Panics without a matching `save`.
    pub fn restore(&mut self) -> &mut Self {
        self.state = match self.saved.pop() {
            Some(state) => state,
            None => panic!("Surface::restore without matching save"),
        };
        self
    }

    pub fn translate(&mut self, dx: f32, dy: f32) -> &mut Self {
        self.state.transform = self.state.transform.translate(dx, dy);
        self
    }

    pub fn scale(&mut self, sx: f32, sy: f32) -> &mut Self {
        self.state.transform = self.state.transform.scale(sx, sy);
        self
    }

    pub fn rotate(&mut self, radians: f32) -> &mut Self {
        self.state.transform = self.state.transform.rotate(radians);
        self
    }

    /// Post-multiplies `t`: it applies before the current transform.
    pub fn transform(&mut self, t: Transform) -> &mut Self {
        self.state.transform = self.state.transform.compose(t);
        self
    }

    pub fn set_fill_color(&mut self, color: Color) -> &mut Self {
        self.state.fill = color;
        self
    }

    /// Multiplies every subsequent draw on top of the inherited alpha; clamped to [0, 1].
    pub fn set_alpha(&mut self, alpha: f32) -> &mut Self {
        self.state.alpha = alpha.clamp(0.0, 1.0);
        self
    }

    fn fill(&self) -> Color {
        self.state.fill.modulate(self.tint())
    }

    fn tint(&self) -> Color {
        self.inherited.with_alpha(self.state.alpha)
    }

    // ── primitives ───────────────────────────────────────────────────────

    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> &mut Self {
        let fill = self.fill();
        let rect = Rect::new(x, y, width, height).normalized();
        self.ctx.fill_rect(&self.state.transform, rect, fill);
        self
    }

    /// Line of `width` centered on the segment, drawn as one rotated quad.
    pub fn draw_line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, width: f32) -> &mut Self {
        let (dx, dy) = (x1 - x0, y1 - y0);
        let length = Vec2::new(dx, dy).length();
        if length == 0.0 {
            return self;
        }
        let xf = self.state.transform.translate(x0, y0).rotate(dy.atan2(dx));
        let fill = self.fill();
        self.ctx.fill_rect(&xf, Rect::new(0.0, -width / 2.0, length, width), fill);
        self
    }

    /// Draws the whole texture into `dest`.
    pub fn draw_image(&mut self, texture: &Texture, dest: Rect) -> &mut Self {
        let tint = self.tint();
        let uv = Rect::from_size(1.0, 1.0);
        self.ctx.draw_quad(texture.id(), &self.state.transform, dest, uv, tint);
        self
    }

    /// Draws `source` (texture pixels) into `dest`.
    pub fn draw_image_region(&mut self, texture: &Texture, dest: Rect, source: Rect) -> &mut Self {
        let (tw, th) = (texture.width() as f32, texture.height() as f32);
        let uv = Rect::new(
            source.origin.x / tw,
            source.origin.y / th,
            source.size.x / tw,
            source.size.y / th,
        );
        let tint = self.tint();
        self.ctx.draw_quad(texture.id(), &self.state.transform, dest, uv, tint);
        self
    }

    /// Solid triangle list in the fill color.
    pub fn fill_triangles(&mut self, points: &[Vec2], indices: &[u16]) -> &mut Self {
        let verts: Vec<TexVertex> = points
            .iter()
            .map(|&pos| TexVertex {
                pos,
                uv: Vec2::zero(),
            })
            .collect();
        let fill = self.fill();
        let white = self.ctx.white_texture().id();
        self.ctx.draw_triangles(white, &self.state.transform, &verts, indices, fill);
        self
    }

    /// Textured triangle list; `uv` in normalized texture coordinates.
    pub fn draw_triangles(
        &mut self,
        texture: &Texture,
        verts: &[TexVertex],
        indices: &[u16],
    ) -> &mut Self {
        let tint = self.tint();
        self.ctx.draw_triangles(texture.id(), &self.state.transform, verts, indices, tint);
        self
    }

    // ── clipping ─────────────────────────────────────────────────────────

    /// Clips to a rect in current surface coordinates (its transformed bounds).
    ///
    /// Returns `false` when nothing would be visible. Always pair with `end_clipped`.
    pub fn start_clipped(&mut self, x: f32, y: f32, width: f32, height: f32) -> bool {
        let bounds = Rect::new(x, y, width, height)
            .normalized()
            .transformed_bounds(self.state.transform);
        self.ctx.start_clipped_physical(bounds)
    }

    pub fn end_clipped(&mut self) -> &mut Self {
        self.ctx.end_clipped();
        self
    }
}

/// Layer backed by a framebuffer texture, redrawn on demand.
#[derive(Debug)]
pub struct SurfaceLayer {
    framebuffer: Framebuffer,
    size: Vec2,
    scale: f32,
}

impl SurfaceLayer {
    pub(crate) fn new(framebuffer: Framebuffer, size: Vec2, scale: f32) -> Self {
        Self {
            framebuffer,
            size,
            scale,
        }
    }

    #[inline]
    pub fn size(&self) -> Vec2 {
        self.size
    }

    #[inline]
    pub fn texture(&self) -> &Texture {
        self.framebuffer.texture()
    }

    /// Redirects drawing into the layer's framebuffer for the duration of `draw`.
    pub(crate) fn draw(&self, ctx: &mut GlContext, draw: impl FnOnce(&mut Surface<'_>)) {
        let texture = self.framebuffer.texture();
        ctx.push_framebuffer(self.framebuffer.id(), texture.width(), texture.height());
        {
            let base = Transform::scaling(self.scale, self.scale);
            let mut surface = Surface::new(ctx, base, Color::WHITE, self.size);
            draw(&mut surface);
        }
        ctx.pop_framebuffer();
    }

    pub(crate) fn paint(&self, ctx: &mut GlContext, xf: &Transform, tint: Color) {
        let dest = Rect::from_size(self.size.x, self.size.y);
        ctx.draw_quad(self.texture().id(), xf, dest, Rect::from_size(1.0, 1.0), tint);
    }
}
