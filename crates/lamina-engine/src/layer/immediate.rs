use crate::coords::{Rect, Transform, Vec2};
use crate::gl::GlContext;
use crate::paint::Color;

use super::surface::Surface;

/// Application drawing code invoked during traversal.
pub trait ImmediateRenderer {
    fn render(&mut self, surface: &mut Surface<'_>);
}

impl<F> ImmediateRenderer for F
where
    F: FnMut(&mut Surface<'_>),
{
    fn render(&mut self, surface: &mut Surface<'_>) {
        self(surface)
    }
}

pub struct ImmediateLayer {
    renderer: Box<dyn ImmediateRenderer>,
    clip: Option<Vec2>,
}

impl ImmediateLayer {
    pub(crate) fn new(renderer: Box<dyn ImmediateRenderer>, clip: Option<Vec2>) -> Self {
        Self { renderer, clip }
    }

    /// Size of the pre-clip rect, if clipped.
    #[inline]
    pub fn clip_size(&self) -> Option<Vec2> {
        self.clip
    }

    /// `tint` is the accumulated layer tint with alpha applied.
    pub(crate) fn paint(&mut self, ctx: &mut GlContext, xf: &Transform, tint: Color) {
        match self.clip {
            None => {
                let mut surface = Surface::new(ctx, *xf, tint, Vec2::zero());
                self.renderer.render(&mut surface);
            }
            Some(size) => {
                let bounds = Rect::from_size(size.x, size.y).transformed_bounds(*xf);
                if ctx.start_clipped_physical(bounds) {
                    let mut surface = Surface::new(ctx, *xf, tint, size);
                    self.renderer.render(&mut surface);
                }
                ctx.end_clipped();
            }
        }
    }
}
