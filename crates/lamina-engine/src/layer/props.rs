use crate::coords::{Transform, Vec2};
use crate::paint::Color;

/// Transform, opacity and visibility shared by every layer kind.
///
/// Setters return `&mut Self` so edits chain:
/// `tree.props_mut(id).set_translation(10.0, 20.0).set_alpha(0.5);`
#[derive(Debug, Clone, PartialEq)]
pub struct LayerProps {
    translation: Vec2,
    rotation: f32,
    scale: Vec2,
    origin: Vec2,
    alpha: f32,
    visible: bool,
    tint: Color,
}

impl Default for LayerProps {
    fn default() -> Self {
        Self {
            translation: Vec2::zero(),
            rotation: 0.0,
            scale: Vec2::splat(1.0),
            origin: Vec2::zero(),
            alpha: 1.0,
            visible: true,
            tint: Color::WHITE,
        }
    }
}

impl LayerProps {
    #[inline]
    pub fn translation(&self) -> Vec2 {
        self.translation
    }

    /// Rotation in radians.
    #[inline]
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    #[inline]
    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    /// Pivot for rotation and scale, in layer space.
    #[inline]
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    #[inline]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    #[inline]
    pub fn visible(&self) -> bool {
        self.visible
    }

    #[inline]
    pub fn tint(&self) -> Color {
        self.tint
    }

    pub fn set_translation(&mut self, x: f32, y: f32) -> &mut Self {
        self.translation = Vec2::new(x, y);
        self
    }

    pub fn set_rotation(&mut self, radians: f32) -> &mut Self {
        self.rotation = radians;
        self
    }

    pub fn set_scale(&mut self, sx: f32, sy: f32) -> &mut Self {
        self.scale = Vec2::new(sx, sy);
        self
    }

    pub fn set_origin(&mut self, x: f32, y: f32) -> &mut Self {
        self.origin = Vec2::new(x, y);
        self
    }

    /// Clamped to [0, 1].
    pub fn set_alpha(&mut self, alpha: f32) -> &mut Self {
        self.alpha = alpha.clamp(0.0, 1.0);
        self
    }

    pub fn set_visible(&mut self, visible: bool) -> &mut Self {
        self.visible = visible;
        self
    }

    pub fn set_tint(&mut self, tint: Color) -> &mut Self {
        self.tint = tint;
        self
    }

    /// `T(origin) ∘ T(translation) ∘ R ∘ S ∘ T(-origin)`.
    pub fn local_transform(&self) -> Transform {
        Transform::translation(self.origin.x, self.origin.y)
            .translate(self.translation.x, self.translation.y)
            .rotate(self.rotation)
            .scale(self.scale.x, self.scale.y)
            .translate(-self.origin.x, -self.origin.y)
    }

    /// Whether traversal skips this layer and its subtree.
    #[inline]
    pub fn is_skipped(&self) -> bool {
        !self.visible || self.alpha <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f32::consts::FRAC_PI_2;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn alpha_is_clamped() {
        let mut p = LayerProps::default();
        assert_eq!(p.set_alpha(1.5).alpha(), 1.0);
        assert_eq!(p.set_alpha(-0.2).alpha(), 0.0);
        assert!(p.is_skipped());
    }

    #[test]
    fn rotation_pivots_around_origin() {
        let mut p = LayerProps::default();
        p.set_origin(5.0, 5.0).set_rotation(FRAC_PI_2);
        let t = p.local_transform();
        assert!(close(t.apply(Vec2::new(5.0, 5.0)), Vec2::new(5.0, 5.0)));
        assert!(close(t.apply(Vec2::new(10.0, 5.0)), Vec2::new(5.0, 10.0)));
    }

    #[test]
    fn translation_then_scale() {
        let mut p = LayerProps::default();
        p.set_translation(10.0, 20.0).set_scale(2.0, 3.0);
        let t = p.local_transform();
        assert!(close(t.apply(Vec2::new(1.0, 1.0)), Vec2::new(12.0, 23.0)));
    }
}
