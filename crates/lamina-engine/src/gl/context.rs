use std::f32::consts::{FRAC_PI_2, PI};

use crate::coords::{Rect, Transform, Vec2};
use crate::error::{Capability, RenderError};
use crate::paint::Color;

use super::backend::{
    Backend, BackendCaps, FilterMode, FramebufferId, PixelData, PixelFormat, Scissor,
    TextureConfig, TextureId,
};
use super::clip::ClipStack;
use super::resource::{Framebuffer, Release, ReleaseQueue, Texture};
use super::shader::{Batcher, FrameStats, Need, QuadShader, TexVertex, TrisShader};

/// Physical orientation of the display relative to the logical view.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    /// Device turned counter-clockwise; logical x runs up the physical y axis.
    LandscapeLeft,
    /// Device turned clockwise; logical x runs down the physical y axis.
    LandscapeRight,
    UpsideDown,
}

impl Orientation {
    #[inline]
    pub fn is_landscape(self) -> bool {
        matches!(self, Orientation::LandscapeLeft | Orientation::LandscapeRight)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ContextConfig {
    /// Sampling filter applied to every texture at creation time.
    pub filter: FilterMode,
    /// Native id of the screen target.
    pub default_framebuffer: FramebufferId,
    /// Physical pixels per logical pixel.
    pub scale_factor: f32,
    pub orientation: Orientation,
    /// Poll the backend for errors in debug builds.
    pub check_errors: bool,
    /// Initial quad batch size, in quads.
    pub quad_capacity: usize,
    /// Initial triangle batch size, in vertices.
    pub tris_vertex_capacity: usize,
    /// Initial triangle batch size, in indices.
    pub tris_index_capacity: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            filter: FilterMode::Linear,
            default_framebuffer: FramebufferId::new(0),
            scale_factor: 1.0,
            orientation: Orientation::Portrait,
            check_errors: true,
            quad_capacity: 1024,
            tris_vertex_capacity: 4096,
            tris_index_capacity: 6144,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum State {
    Uninitialized,
    Ready,
    InFrame,
}

/// A bound draw target and the clips active on it.
#[derive(Debug)]
struct Target {
    framebuffer: FramebufferId,
    width: u32,
    height: u32,
    /// Maps logical clip rects into this target's pixels.
    to_physical: Transform,
    clips: ClipStack,
}

/// Owns the backend and everything drawn through it.
///
/// Layers never touch the backend directly: every draw request, clip and
/// target change goes through here so batching can flush at the right time.
///
/// Lifecycle: [`GlContext::new`] → [`init`](GlContext::init) →
/// ([`begin_frame`](GlContext::begin_frame) … [`end_frame`](GlContext::end_frame))* →
/// [`destroy`](GlContext::destroy). Drawing before `init` panics.
pub struct GlContext {
    backend: Box<dyn Backend>,
    config: ContextConfig,
    state: State,
    batcher: Option<Batcher>,
    white: Option<Texture>,
    releases: ReleaseQueue,

    target: Target,
    saved_targets: Vec<Target>,

    logical_size: Vec2,
    root: Transform,
}

impl GlContext {
    pub fn new(backend: Box<dyn Backend>, config: ContextConfig) -> Self {
        let root = root_transform(config.orientation, config.scale_factor, Vec2::zero());
        Self {
            backend,
            config,
            state: State::Uninitialized,
            batcher: None,
            white: None,
            releases: ReleaseQueue::default(),
            target: Target {
                framebuffer: config.default_framebuffer,
                width: 0,
                height: 0,
                to_physical: root,
                clips: ClipStack::default(),
            },
            saved_targets: Vec::new(),
            logical_size: Vec2::zero(),
            root,
        }
    }

    /// Creates the shader buffers and the white fill texture.
    pub fn init(&mut self) -> Result<(), RenderError> {
        assert_eq!(self.state, State::Uninitialized, "GlContext initialized twice");

        let caps = self.backend.caps();
        log::debug!(
            "backend caps: immediate={} framebuffers={} max_texture={}",
            caps.immediate_rendering,
            caps.framebuffers,
            caps.max_texture_size
        );

        let backend = self.backend.as_mut();
        let quad = QuadShader::new(backend, self.config.quad_capacity)?;
        let tris = TrisShader::new(
            backend,
            self.config.tris_vertex_capacity,
            self.config.tris_index_capacity,
        )?;
        self.batcher = Some(Batcher::new(quad, tris));

        let white = self.create_texture(1, 1, false, false)?;
        let pixels = PixelData::validated(&[255; 4], 1, 1, PixelFormat::Rgba8)?;
        self.backend.upload_texture(white.id(), &pixels);
        self.white = Some(white);

        self.state = State::Ready;
        self.check_error("init");
        Ok(())
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state != State::Uninitialized
    }

    #[inline]
    pub fn caps(&self) -> BackendCaps {
        self.backend.caps()
    }

    #[inline]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Fails with `Unsupported` unless the backend offers `capability`.
    pub fn require(&self, capability: Capability) -> Result<(), RenderError> {
        let caps = self.caps();
        let supported = match capability {
            Capability::ImmediateRendering => caps.immediate_rendering,
            Capability::Framebuffers => caps.framebuffers,
        };
        if supported { Ok(()) } else { Err(RenderError::Unsupported(capability)) }
    }

    #[inline]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut dyn Backend {
        self.backend.as_mut()
    }

    fn batcher(&mut self) -> (&mut Batcher, &mut dyn Backend) {
        match self.batcher.as_mut() {
            Some(batcher) => (batcher, self.backend.as_mut()),
            None => panic!("GlContext used before init()"),
        }
    }

    // ── geometry ─────────────────────────────────────────────────────────

    /// Sets the logical view size and recomputes the root transform.
    pub fn set_size(&mut self, width: f32, height: f32) {
        self.logical_size = Vec2::new(width, height);
        self.root = root_transform(
            self.config.orientation,
            self.config.scale_factor,
            self.logical_size,
        );
        let on_screen = self.target.framebuffer == self.config.default_framebuffer;
        if self.saved_targets.is_empty() && on_screen {
            let (w, h) = self.physical_size();
            self.target.width = w;
            self.target.height = h;
            self.target.to_physical = self.root;
        }
        log::debug!("view size {width}x{height} (physical {:?})", self.physical_size());
    }

    #[inline]
    pub fn logical_size(&self) -> Vec2 {
        self.logical_size
    }

    /// Screen size in physical pixels, accounting for orientation.
    pub fn physical_size(&self) -> (u32, u32) {
        let s = self.config.scale_factor;
        let (w, h) = (self.logical_size.x * s, self.logical_size.y * s);
        let (w, h) = if self.config.orientation.is_landscape() { (h, w) } else { (w, h) };
        (w.round().max(0.0) as u32, h.round().max(0.0) as u32)
    }

    #[inline]
    pub fn scale_factor(&self) -> f32 {
        self.config.scale_factor
    }

    /// Device transform applied before any layer transform.
    #[inline]
    pub fn root_transform(&self) -> Transform {
        self.root
    }

    // ── textures ─────────────────────────────────────────────────────────

    /// Allocates an empty texture using the context filter mode.
    pub fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        repeat_x: bool,
        repeat_y: bool,
    ) -> Result<Texture, RenderError> {
        let config = TextureConfig {
            width,
            height,
            repeat_x,
            repeat_y,
            filter: self.config.filter,
        };
        let id = self.backend.create_texture(&config)?;
        log::debug!("created {id:?} {width}x{height}");
        Ok(Texture::new(id, config, &self.releases))
    }

    /// Creates a texture sized to `data` and fills it.
    pub fn upload_texture(&mut self, data: &PixelData<'_>) -> Result<Texture, RenderError> {
        let texture = self.create_texture(data.width, data.height, false, false)?;
        self.update_texture(&texture, data);
        Ok(texture)
    }

    /// Replaces the contents of `texture`. Pending geometry is flushed first.
    ///
    /// # Panics
    /// Panics if `data` does not match the texture size.
    pub fn update_texture(&mut self, texture: &Texture, data: &PixelData<'_>) {
        assert!(
            data.width == texture.width() && data.height == texture.height(),
            "{}x{} pixels uploaded into {texture:?}",
            data.width,
            data.height
        );
        if let Some(batcher) = self.batcher.as_mut() {
            batcher.flush(self.backend.as_mut());
        }
        self.backend.upload_texture(texture.id(), data);
        self.check_error("update_texture");
    }

    /// Deletes a raw texture handle, typically one obtained through `Texture::release`.
    pub fn destroy_texture(&mut self, id: TextureId) {
        if let Some(batcher) = self.batcher.as_mut() {
            batcher.flush(self.backend.as_mut());
            batcher.forget_texture(id);
        }
        log::debug!("deleting {id:?}");
        self.backend.delete_texture(id);
    }

    /// The 1×1 white texture used for solid fills.
    pub fn white_texture(&self) -> &Texture {
        match &self.white {
            Some(white) => white,
            None => panic!("GlContext used before init()"),
        }
    }

    // ── framebuffers ─────────────────────────────────────────────────────

    pub fn create_framebuffer(&mut self, texture: &Texture) -> Result<Framebuffer, RenderError> {
        self.require(Capability::Framebuffers)?;
        let id = self.backend.create_framebuffer(texture.id())?;
        log::debug!("created {id:?} for {:?}", texture.id());
        Ok(Framebuffer::new(id, texture.clone(), &self.releases))
    }

    #[inline]
    pub fn default_framebuffer(&self) -> FramebufferId {
        self.config.default_framebuffer
    }

    /// Switches the draw target, discarding nothing but the scissor.
    ///
    /// # Panics
    /// Panics while clips are active on the current target.
    pub fn bind_framebuffer(&mut self, framebuffer: FramebufferId, width: u32, height: u32) {
        assert!(
            self.target.clips.is_empty(),
            "bind_framebuffer with {} active clips",
            self.target.clips.depth()
        );
        self.flush();
        let to_physical = if framebuffer == self.config.default_framebuffer {
            self.root
        } else {
            Transform::IDENTITY
        };
        self.target = Target {
            framebuffer,
            width,
            height,
            to_physical,
            clips: ClipStack::default(),
        };
        self.backend.bind_framebuffer(framebuffer, width, height);
        self.backend.set_scissor(None);
    }

    /// Redirects drawing into `framebuffer` until the matching `pop_framebuffer`.
    pub fn push_framebuffer(&mut self, framebuffer: FramebufferId, width: u32, height: u32) {
        self.flush();
        let next = Target {
            framebuffer,
            width,
            height,
            to_physical: Transform::IDENTITY,
            clips: ClipStack::default(),
        };
        let previous = std::mem::replace(&mut self.target, next);
        self.saved_targets.push(previous);
        self.backend.bind_framebuffer(framebuffer, width, height);
        self.backend.set_scissor(None);
    }

    /// Restores the target and scissor saved by `push_framebuffer`.
    pub fn pop_framebuffer(&mut self) {
        self.flush();
        assert!(
            self.target.clips.is_empty(),
            "pop_framebuffer with {} active clips",
            self.target.clips.depth()
        );
        self.target = match self.saved_targets.pop() {
            Some(target) => target,
            None => panic!("pop_framebuffer called without matching push_framebuffer"),
        };
        let Target { framebuffer, width, height, .. } = self.target;
        self.backend.bind_framebuffer(framebuffer, width, height);
        self.backend.set_scissor(self.target.clips.current());
    }

    #[inline]
    pub fn current_framebuffer(&self) -> FramebufferId {
        self.target.framebuffer
    }

    // ── clipping ─────────────────────────────────────────────────────────

    /// Clips to `rect`, given in logical coordinates of the current target.
    ///
    /// Returns `false` when the effective clip is empty, in which case the
    /// caller may skip drawing but must still call `end_clipped`.
    pub fn start_clipped(&mut self, rect: Rect) -> bool {
        let bounds = rect.normalized().transformed_bounds(self.target.to_physical);
        self.start_clipped_physical(bounds)
    }

    /// Clips to `bounds`, already in physical pixels of the current target.
    pub fn start_clipped_physical(&mut self, bounds: Rect) -> bool {
        let scissor = self.to_scissor(bounds);
        self.flush();
        let effective = self.target.clips.push(scissor);
        self.backend.set_scissor(Some(effective));
        !effective.is_empty()
    }

    /// Pops the innermost clip and restores the previous scissor.
    pub fn end_clipped(&mut self) {
        self.flush();
        let restored = self.target.clips.pop();
        self.backend.set_scissor(restored);
    }

    #[inline]
    pub fn clip_depth(&self) -> usize {
        self.target.clips.depth()
    }

    /// Non-finite edges collapse to an empty scissor.
    fn to_scissor(&self, bounds: Rect) -> Scissor {
        let (tw, th) = (self.target.width as f32, self.target.height as f32);
        let max = bounds.max();
        // f32::max/min drop a NaN operand, clamp would panic on it.
        let x0 = bounds.origin.x.floor().max(0.0).min(tw);
        let y0 = bounds.origin.y.floor().max(0.0).min(th);
        let x1 = if max.x.is_nan() { x0 } else { max.x.ceil().max(x0).min(tw) };
        let y1 = if max.y.is_nan() { y0 } else { max.y.ceil().max(y0).min(th) };
        Scissor::new(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
    }

    // ── drawing ──────────────────────────────────────────────────────────

    pub fn active_texture(&mut self, unit: u32) {
        self.backend.active_texture(unit);
    }

    /// Binds `texture` for the next requests, flushing if it changes.
    pub fn bind_texture(&mut self, texture: TextureId) {
        let (batcher, backend) = self.batcher();
        batcher.bind_texture(backend, texture);
    }

    /// Queues one textured quad: `dest` in local space, `uv` in texture space.
    pub fn draw_quad(
        &mut self,
        texture: TextureId,
        xf: &Transform,
        dest: Rect,
        uv: Rect,
        tint: Color,
    ) {
        let (batcher, backend) = self.batcher();
        batcher.prepare(backend, texture, Need::Quads(1));
        batcher.add_quad(xf, dest, uv, tint);
    }

    /// Queues an indexed triangle list.
    ///
    /// # Panics
    /// Panics if `indices` is not a whole number of triangles.
    pub fn draw_triangles(
        &mut self,
        texture: TextureId,
        xf: &Transform,
        verts: &[TexVertex],
        indices: &[u16],
        tint: Color,
    ) {
        assert!(indices.len() % 3 == 0, "{} indices do not form triangles", indices.len());
        if indices.is_empty() {
            return;
        }
        let (batcher, backend) = self.batcher();
        let need = Need::Tris {
            vertices: verts.len(),
            indices: indices.len(),
        };
        batcher.prepare(backend, texture, need);
        batcher.add_triangles(xf, verts, indices, tint);
    }

    /// Solid fill through the white texture.
    pub fn fill_rect(&mut self, xf: &Transform, rect: Rect, color: Color) {
        let white = self.white_texture().id();
        self.draw_quad(white, xf, rect, Rect::from_size(1.0, 1.0), color);
    }

    /// Clears the current target inside the active clip.
    pub fn clear(&mut self, color: Color) {
        self.flush();
        self.backend.clear(color);
    }

    pub fn flush(&mut self) {
        if let Some(batcher) = self.batcher.as_mut() {
            batcher.flush(self.backend.as_mut());
        }
    }

    // ── frame ────────────────────────────────────────────────────────────

    /// Binds the screen, disables the scissor and frees released resources.
    ///
    /// Geometry queued since the last frame is flushed to its own target first.
    pub fn begin_frame(&mut self) {
        assert_ne!(self.state, State::Uninitialized, "begin_frame before init()");
        assert_ne!(self.state, State::InFrame, "begin_frame called twice");

        self.flush();
        self.collect_garbage();
        let (batcher, _) = self.batcher();
        batcher.reset_stats();
        batcher.invalidate();

        let (w, h) = self.physical_size();
        self.bind_framebuffer(self.config.default_framebuffer, w, h);
        self.state = State::InFrame;
    }

    /// Flushes and verifies that clips and framebuffers were balanced.
    pub fn end_frame(&mut self) -> FrameStats {
        assert_eq!(self.state, State::InFrame, "end_frame without begin_frame");
        self.flush();
        assert!(
            self.saved_targets.is_empty(),
            "{} framebuffers left pushed",
            self.saved_targets.len()
        );
        assert!(
            self.target.clips.is_empty(),
            "{} clips left active",
            self.target.clips.depth()
        );

        self.state = State::Ready;
        let stats = self.stats();
        log::trace!("frame: {stats:?}");
        stats
    }

    #[inline]
    pub fn in_frame(&self) -> bool {
        self.state == State::InFrame
    }

    pub fn stats(&self) -> FrameStats {
        self.batcher.as_ref().map(Batcher::stats).unwrap_or_default()
    }

    /// Deletes every native resource whose last handle has dropped.
    pub fn collect_garbage(&mut self) -> usize {
        let released = self.releases.drain();
        if released.is_empty() {
            return 0;
        }
        self.flush();
        for release in &released {
            match *release {
                Release::Texture(id) => {
                    if let Some(batcher) = self.batcher.as_mut() {
                        batcher.forget_texture(id);
                    }
                    self.backend.delete_texture(id);
                }
                Release::Framebuffer(id) => self.backend.delete_framebuffer(id),
            }
        }
        log::debug!("released {} native resources", released.len());
        released.len()
    }

    /// Reports pending backend errors tagged with `op`. Debug builds only.
    ///
    /// Returns how many errors were reported.
    pub fn check_error(&mut self, op: &str) -> usize {
        if !cfg!(debug_assertions) || !self.config.check_errors {
            return 0;
        }
        let mut count = 0;
        while let Some(err) = self.backend.take_error() {
            log::warn!("{op}: {err}");
            count += 1;
        }
        count
    }

    /// Releases everything the context owns and returns the backend.
    pub fn destroy(mut self) -> Box<dyn Backend> {
        self.flush();
        if let Some(white) = self.white.take() {
            let id = white.release();
            self.backend.delete_texture(id);
        }
        if let Some(batcher) = self.batcher.take() {
            batcher.destroy(self.backend.as_mut());
        }
        self.collect_garbage();
        log::debug!("context destroyed");
        self.backend
    }
}

/// Maps logical view coordinates to physical pixels of the screen target.
fn root_transform(orientation: Orientation, scale: f32, size: Vec2) -> Transform {
    let scaling = Transform::scaling(scale, scale);
    let oriented = match orientation {
        Orientation::Portrait => Transform::IDENTITY,
        Orientation::UpsideDown => Transform::translation(size.x, size.y).rotate(PI),
        Orientation::LandscapeRight => Transform::translation(size.y, 0.0).rotate(FRAC_PI_2),
        Orientation::LandscapeLeft => Transform::translation(0.0, size.x).rotate(-FRAC_PI_2),
    };
    scaling.compose(oriented)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::recording::{Command, RecordingBackend};

    fn context(config: ContextConfig) -> GlContext {
        let mut ctx = GlContext::new(Box::new(RecordingBackend::new()), config);
        ctx.init().unwrap();
        ctx.set_size(100.0, 50.0);
        ctx
    }

    fn recorder(ctx: &GlContext) -> &RecordingBackend {
        ctx.backend().as_any().downcast_ref::<RecordingBackend>().unwrap()
    }

    fn close(a: Vec2, b: Vec2) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    #[should_panic(expected = "before init")]
    fn drawing_before_init_panics() {
        let mut ctx = GlContext::new(Box::new(RecordingBackend::new()), ContextConfig::default());
        ctx.draw_quad(
            TextureId::new(1),
            &Transform::IDENTITY,
            Rect::from_size(1.0, 1.0),
            Rect::from_size(1.0, 1.0),
            Color::WHITE,
        );
    }

    #[test]
    fn root_transform_follows_orientation() {
        let p = Vec2::new(10.0, 5.0);
        let cases = [
            (Orientation::Portrait, Vec2::new(20.0, 10.0), (200, 100)),
            (Orientation::UpsideDown, Vec2::new(180.0, 90.0), (200, 100)),
            (Orientation::LandscapeRight, Vec2::new(90.0, 20.0), (100, 200)),
            (Orientation::LandscapeLeft, Vec2::new(10.0, 180.0), (100, 200)),
        ];
        for (orientation, expected, physical) in cases {
            let ctx = context(ContextConfig {
                orientation,
                scale_factor: 2.0,
                ..Default::default()
            });
            let mapped = ctx.root_transform().apply(p);
            assert!(close(mapped, expected), "{orientation:?}: {mapped:?}");
            assert_eq!(ctx.physical_size(), physical);
        }
    }

    #[test]
    fn start_clipped_flushes_before_scissor() {
        let mut ctx = context(ContextConfig::default());
        ctx.begin_frame();
        ctx.fill_rect(&Transform::IDENTITY, Rect::from_size(4.0, 4.0), Color::BLACK);
        assert!(ctx.start_clipped(Rect::new(10.0, 10.0, 20.0, 20.0)));
        ctx.end_clipped();
        ctx.end_frame();

        let tail: Vec<_> = recorder(&ctx)
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::Draw(_) | Command::SetScissor(_)))
            .cloned()
            .collect();
        assert!(matches!(tail[0], Command::SetScissor(None)));
        assert!(matches!(tail[1], Command::Draw(_)));
        assert_eq!(tail[2], Command::SetScissor(Some(Scissor::new(10, 10, 20, 20))));
        assert_eq!(tail[3], Command::SetScissor(None));
    }

    #[test]
    fn clip_rect_is_scaled_and_clamped() {
        let mut ctx = context(ContextConfig {
            scale_factor: 2.0,
            ..Default::default()
        });
        ctx.begin_frame();
        ctx.start_clipped(Rect::new(-5.0, 40.0, 20.0, 30.0));
        let last = recorder(&ctx).commands().last().cloned();
        assert_eq!(last, Some(Command::SetScissor(Some(Scissor::new(0, 80, 30, 20)))));
        ctx.end_clipped();
        ctx.end_frame();
    }

    #[test]
    fn disjoint_nested_clip_reports_empty() {
        let mut ctx = context(ContextConfig::default());
        ctx.begin_frame();
        assert!(ctx.start_clipped(Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert!(!ctx.start_clipped(Rect::new(20.0, 20.0, 10.0, 10.0)));
        ctx.end_clipped();
        ctx.end_clipped();
        ctx.end_frame();
    }

    #[test]
    fn nan_clip_bounds_clip_everything() {
        let mut ctx = context(ContextConfig::default());
        ctx.begin_frame();
        assert!(!ctx.start_clipped_physical(Rect::new(f32::NAN, 0.0, 10.0, 10.0)));
        assert!(!ctx.start_clipped(Rect::new(0.0, 0.0, f32::NAN, 10.0)));
        ctx.end_clipped();
        ctx.end_clipped();
        ctx.end_frame();
    }

    #[test]
    fn geometry_queued_between_frames_lands_before_the_next_clear() {
        let mut ctx = context(ContextConfig::default());
        let a = ctx.create_texture(1, 1, false, false).unwrap();
        let b = ctx.create_texture(1, 1, false, false).unwrap();
        let unit = Rect::from_size(1.0, 1.0);

        ctx.draw_quad(a.id(), &Transform::IDENTITY, unit, unit, Color::WHITE);
        ctx.begin_frame();
        ctx.clear(Color::BLACK);
        ctx.draw_quad(b.id(), &Transform::IDENTITY, unit, unit, Color::WHITE);
        ctx.end_frame();

        let rec = recorder(&ctx);
        assert_eq!(rec.draws().len(), 2);
        assert_eq!(rec.draws()[0].texture, Some(a.id()));
        assert_eq!(rec.draws()[1].texture, Some(b.id()));

        let commands = rec.commands();
        let first_draw = commands.iter().position(|c| matches!(c, Command::Draw(_)));
        let clear = commands.iter().position(|c| matches!(c, Command::Clear { .. }));
        assert!(first_draw < clear, "{commands:?}");
    }

    #[test]
    #[should_panic(expected = "clips left active")]
    fn unbalanced_clip_fails_at_end_frame() {
        let mut ctx = context(ContextConfig::default());
        ctx.begin_frame();
        ctx.start_clipped(Rect::new(0.0, 0.0, 10.0, 10.0));
        ctx.end_frame();
    }

    #[test]
    fn dropped_texture_is_deleted_at_next_frame() {
        let mut ctx = context(ContextConfig::default());
        let tex = ctx.create_texture(8, 8, false, false).unwrap();
        let id = tex.id();
        drop(tex);
        assert!(recorder(&ctx).is_texture_live(id));

        ctx.begin_frame();
        assert!(!recorder(&ctx).is_texture_live(id));
        ctx.end_frame();
    }

    #[test]
    fn released_texture_needs_explicit_destroy() {
        let mut ctx = context(ContextConfig::default());
        let id = ctx.create_texture(8, 8, false, false).unwrap().release();
        assert_eq!(ctx.collect_garbage(), 0);
        assert!(recorder(&ctx).is_texture_live(id));

        ctx.destroy_texture(id);
        assert!(!recorder(&ctx).is_texture_live(id));
    }

    #[test]
    fn pop_framebuffer_restores_target_and_scissor() {
        let mut ctx = context(ContextConfig::default());
        let tex = ctx.create_texture(16, 16, false, false).unwrap();
        let fb = ctx.create_framebuffer(&tex).unwrap();

        ctx.begin_frame();
        ctx.start_clipped(Rect::new(0.0, 0.0, 30.0, 30.0));
        ctx.push_framebuffer(fb.id(), 16, 16);
        assert_eq!(ctx.current_framebuffer(), fb.id());
        assert_eq!(ctx.clip_depth(), 0);
        assert_eq!(recorder(&ctx).commands().last(), Some(&Command::SetScissor(None)));

        ctx.pop_framebuffer();
        assert_eq!(ctx.current_framebuffer(), ctx.default_framebuffer());
        assert_eq!(
            recorder(&ctx).commands().last(),
            Some(&Command::SetScissor(Some(Scissor::new(0, 0, 30, 30))))
        );
        ctx.end_clipped();
        ctx.end_frame();
    }

    #[test]
    fn framebuffers_require_capability() {
        let backend = RecordingBackend::with_caps(BackendCaps {
            framebuffers: false,
            ..Default::default()
        });
        let mut ctx = GlContext::new(Box::new(backend), ContextConfig::default());
        ctx.init().unwrap();
        let tex = ctx.create_texture(4, 4, false, false).unwrap();
        assert_eq!(
            ctx.create_framebuffer(&tex).unwrap_err(),
            RenderError::Unsupported(Capability::Framebuffers)
        );
    }

    #[test]
    fn oversized_texture_is_recoverable() {
        let mut ctx = context(ContextConfig::default());
        let err = ctx.create_texture(100_000, 4, false, false).unwrap_err();
        assert_eq!(err, RenderError::exhausted("texture"));
    }

    #[test]
    fn check_error_drains_backend_errors() {
        let mut ctx = context(ContextConfig::default());
        ctx.backend_mut()
            .as_any_mut()
            .downcast_mut::<RecordingBackend>()
            .unwrap()
            .inject_error("GL_INVALID_OPERATION");
        assert_eq!(ctx.check_error("test"), 1);
        assert_eq!(ctx.check_error("test"), 0);
    }

    #[test]
    fn update_texture_flushes_pending_geometry() {
        let mut ctx = context(ContextConfig::default());
        let tex = ctx.create_texture(1, 1, false, false).unwrap();
        ctx.begin_frame();
        let unit = Rect::from_size(1.0, 1.0);
        ctx.draw_quad(tex.id(), &Transform::IDENTITY, unit, unit, Color::WHITE);
        let pixels = PixelData::validated(&[0; 4], 1, 1, PixelFormat::Rgba8).unwrap();
        ctx.update_texture(&tex, &pixels);

        let draw_then_upload = recorder(&ctx)
            .commands()
            .windows(2)
            .any(|w| matches!(w, [Command::Draw(_), Command::UploadTexture { .. }]));
        assert!(draw_then_upload);
        ctx.end_frame();
    }

    #[test]
    fn destroy_returns_backend_with_nothing_live() {
        let mut ctx = context(ContextConfig::default());
        let tex = ctx.create_texture(2, 2, false, false).unwrap();
        drop(tex);
        let backend = ctx.destroy();
        let rec = backend.as_any().downcast_ref::<RecordingBackend>().unwrap();
        assert_eq!(rec.live_textures(), 0);
    }
}
