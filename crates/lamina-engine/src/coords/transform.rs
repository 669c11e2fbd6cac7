use super::Vec2;

/// 2D affine transform stored as a 2×3 matrix.
///
/// A point maps as:
///
/// ```text
/// x' = m00 * x + m10 * y + tx
/// y' = m01 * x + m11 * y + ty
/// ```
///
/// All builder methods are post-multiplications: `t.translate(dx, dy)` returns
/// `t ∘ T(dx, dy)`, so the translation happens in `t`'s local space before `t`
/// itself is applied. Degenerate matrices are not rejected; NaN propagates.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub m00: f32,
    pub m01: f32,
    pub m10: f32,
    pub m11: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    #[inline]
    pub const fn new(m00: f32, m01: f32, m10: f32, m11: f32, tx: f32, ty: f32) -> Self {
        Self {
            m00,
            m01,
            m10,
            m11,
            tx,
            ty,
        }
    }

    #[inline]
    pub const fn translation(dx: f32, dy: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, dx, dy)
    }

    #[inline]
    pub const fn scaling(sx: f32, sy: f32) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Rotation by `radians`. With +Y down, positive angles turn clockwise on screen.
    #[inline]
    pub fn rotation(radians: f32) -> Self {
        let (s, c) = radians.sin_cos();
        Self::new(c, s, -s, c, 0.0, 0.0)
    }

    /// Returns `self ∘ other`: `other` is applied first.
    #[must_use]
    pub fn compose(self, other: Transform) -> Self {
        Self {
            m00: self.m00 * other.m00 + self.m10 * other.m01,
            m01: self.m01 * other.m00 + self.m11 * other.m01,
            m10: self.m00 * other.m10 + self.m10 * other.m11,
            m11: self.m01 * other.m10 + self.m11 * other.m11,
            tx: self.m00 * other.tx + self.m10 * other.ty + self.tx,
            ty: self.m01 * other.tx + self.m11 * other.ty + self.ty,
        }
    }

    #[inline]
    #[must_use]
    pub fn translate(self, dx: f32, dy: f32) -> Self {
        Self {
            tx: self.m00 * dx + self.m10 * dy + self.tx,
            ty: self.m01 * dx + self.m11 * dy + self.ty,
            ..self
        }
    }

    #[inline]
    #[must_use]
    pub fn scale(self, sx: f32, sy: f32) -> Self {
        Self {
            m00: self.m00 * sx,
            m01: self.m01 * sx,
            m10: self.m10 * sy,
            m11: self.m11 * sy,
            ..self
        }
    }

    #[inline]
    #[must_use]
    pub fn rotate(self, radians: f32) -> Self {
        self.compose(Self::rotation(radians))
    }

    /// Inverse map. Singular matrices yield non-finite components.
    #[must_use]
    pub fn invert(self) -> Self {
        let det = self.m00 * self.m11 - self.m10 * self.m01;
        let inv = 1.0 / det;

        let m00 = self.m11 * inv;
        let m01 = -self.m01 * inv;
        let m10 = -self.m10 * inv;
        let m11 = self.m00 * inv;

        Self {
            m00,
            m01,
            m10,
            m11,
            tx: -(m00 * self.tx + m10 * self.ty),
            ty: -(m01 * self.tx + m11 * self.ty),
        }
    }

    #[inline]
    pub fn apply(self, p: Vec2) -> Vec2 {
        Vec2::new(
            self.m00 * p.x + self.m10 * p.y + self.tx,
            self.m01 * p.x + self.m11 * p.y + self.ty,
        )
    }

    /// Applies only the linear part (no translation).
    #[inline]
    pub fn apply_vector(self, v: Vec2) -> Vec2 {
        Vec2::new(self.m00 * v.x + self.m10 * v.y, self.m01 * v.x + self.m11 * v.y)
    }

    /// Length of the transformed X axis.
    #[inline]
    pub fn scale_x(self) -> f32 {
        (self.m00 * self.m00 + self.m01 * self.m01).sqrt()
    }

    /// Length of the transformed Y axis.
    #[inline]
    pub fn scale_y(self) -> f32 {
        (self.m10 * self.m10 + self.m11 * self.m11).sqrt()
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.m00.is_finite()
            && self.m01.is_finite()
            && self.m10.is_finite()
            && self.m11.is_finite()
            && self.tx.is_finite()
            && self.ty.is_finite()
    }

    /// Layout used by the quad program's instance data.
    #[inline]
    pub fn to_array(self) -> [f32; 6] {
        [self.m00, self.m01, self.m10, self.m11, self.tx, self.ty]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f32::consts::FRAC_PI_2;

    const EPS: f32 = 1e-4;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a.x - b.x).abs() <= EPS && (a.y - b.y).abs() <= EPS
    }

    #[test]
    fn identity_maps_point_to_itself() {
        let p = Vec2::new(3.5, -2.0);
        assert_eq!(Transform::IDENTITY.apply(p), p);
    }

    #[test]
    fn compose_applies_right_operand_first() {
        let t = Transform::translation(10.0, 0.0);
        let s = Transform::scaling(2.0, 2.0);

        // scale first, then translate
        assert!(close(t.compose(s).apply(Vec2::new(1.0, 1.0)), Vec2::new(12.0, 2.0)));
        // translate first, then scale
        assert!(close(s.compose(t).apply(Vec2::new(1.0, 1.0)), Vec2::new(22.0, 2.0)));
    }

    #[test]
    fn builder_methods_match_compose() {
        let base = Transform::translation(5.0, 7.0).rotate(0.3);
        assert_eq!(base.translate(2.0, 3.0), base.compose(Transform::translation(2.0, 3.0)));
        assert_eq!(base.scale(2.0, 0.5), base.compose(Transform::scaling(2.0, 0.5)));
    }

    #[test]
    fn quarter_turn_is_clockwise_with_y_down() {
        let r = Transform::rotation(FRAC_PI_2);
        assert!(close(r.apply(Vec2::new(1.0, 0.0)), Vec2::new(0.0, 1.0)));
    }

    #[test]
    fn inverse_composed_with_original_is_identity() {
        let samples = [
            Transform::translation(10.0, -4.0),
            Transform::scaling(3.0, 0.25),
            Transform::rotation(1.1).translate(7.0, 2.0).scale(2.0, 5.0),
            Transform::new(1.0, 0.5, -0.25, 2.0, 100.0, -50.0),
        ];
        let points = [Vec2::new(0.0, 0.0), Vec2::new(12.5, -3.0), Vec2::new(-400.0, 250.0)];

        for t in samples {
            let round = t.invert().compose(t);
            for p in points {
                assert!(close(round.apply(p), p), "{t:?} failed for {p:?}");
            }
        }
    }

    #[test]
    fn invert_of_singular_is_not_finite() {
        assert!(!Transform::scaling(0.0, 1.0).invert().is_finite());
    }

    #[test]
    fn axis_scales_survive_rotation() {
        let t = Transform::rotation(0.7).scale(3.0, 4.0);
        assert!((t.scale_x() - 3.0).abs() < EPS);
        assert!((t.scale_y() - 4.0).abs() < EPS);
    }
}
