//! Depth-first paint traversal and hit testing.

use log::trace;

use crate::coords::{Rect, Transform, Vec2};
use crate::gl::GlContext;
use crate::paint::Color;

use super::id::LayerId;
use super::tree::{LayerKind, LayerTree};

impl LayerTree {
    /// Paints `root` and its subtree, parents before children.
    ///
    /// `xf` maps the root's parent space to physical target pixels. A layer
    /// that is hidden or whose own alpha is zero is skipped with its whole
    /// subtree; stale child ids are ignored.
    pub fn paint(&mut self, root: LayerId, ctx: &mut GlContext, xf: &Transform, alpha: f32) {
        self.paint_layer(root, ctx, xf, alpha.clamp(0.0, 1.0), Color::WHITE);
    }

    fn paint_layer(
        &mut self,
        id: LayerId,
        ctx: &mut GlContext,
        parent_xf: &Transform,
        parent_alpha: f32,
        parent_tint: Color,
    ) {
        let Some(node) = self.get(id) else {
            trace!("skipping stale {id:?}");
            return;
        };
        if node.props.is_skipped() {
            return;
        }
        let xf = parent_xf.compose(node.props.local_transform());
        let alpha = (parent_alpha * node.props.alpha()).clamp(0.0, 1.0);
        let tint = parent_tint.modulate(node.props.tint());
        let group_len = match &node.kind {
            LayerKind::Group(group) => Some(group.children.len()),
            _ => None,
        };

        if let Some(len) = group_len {
            for i in 0..len {
                let child = match self.kind(id) {
                    Some(LayerKind::Group(group)) => match group.children.get(i) {
                        Some(&child) => child,
                        None => break,
                    },
                    _ => break,
                };
                self.paint_layer(child, ctx, &xf, alpha, tint);
            }
            return;
        }

        let draw_tint = tint.with_alpha(alpha);
        match self.kind_mut(id) {
            Some(LayerKind::Image(image)) => image.paint(ctx, &xf, draw_tint),
            Some(LayerKind::Surface(surface)) => surface.paint(ctx, &xf, draw_tint),
            Some(LayerKind::Canvas(canvas)) => canvas.paint(ctx, &xf, draw_tint),
            Some(LayerKind::Immediate(immediate)) => immediate.paint(ctx, &xf, draw_tint),
            Some(LayerKind::Group(_)) | None => {}
        }
    }

    /// Top-most visible sized leaf under `point`, in the root's parent space.
    ///
    /// Children are searched in reverse paint order so later siblings win.
    pub fn hit_test(&self, root: LayerId, point: Vec2) -> Option<LayerId> {
        self.hit_layer(root, &Transform::IDENTITY, point)
    }

    fn hit_layer(&self, id: LayerId, parent_xf: &Transform, point: Vec2) -> Option<LayerId> {
        let node = self.get(id)?;
        if node.props.is_skipped() {
            return None;
        }
        let xf = parent_xf.compose(node.props.local_transform());
        if let LayerKind::Group(group) = &node.kind {
            return group.children.iter().rev().find_map(|&child| self.hit_layer(child, &xf, point));
        }
        let size = node.kind.size()?;
        let local = xf.invert().apply(point);
        Rect::from_size(size.x, size.y).contains(local).then_some(id)
    }

    /// Maps layer space to the space of its top-most ancestor.
    pub fn world_transform(&self, id: LayerId) -> Option<Transform> {
        let node = self.get(id)?;
        let mut xf = node.props.local_transform();
        let mut cursor = node.parent;
        while let Some(parent) = cursor {
            let Some(node) = self.get(parent) else {
                break;
            };
            xf = node.props.local_transform().compose(xf);
            cursor = node.parent;
        }
        Some(xf)
    }

    pub fn layer_to_screen(&self, id: LayerId, point: Vec2) -> Option<Vec2> {
        self.world_transform(id).map(|xf| xf.apply(point))
    }

    pub fn screen_to_layer(&self, id: LayerId, point: Vec2) -> Option<Vec2> {
        self.world_transform(id).map(|xf| xf.invert().apply(point))
    }
}
