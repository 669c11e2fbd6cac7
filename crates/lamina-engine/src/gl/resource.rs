//! Scoped native resources.
//!
//! `Texture` and `Framebuffer` own a native handle and release it exactly
//! once. Drop cannot reach the backend, so releases are queued and the
//! context deletes them at the next `begin_frame` or `collect_garbage`.
//! Handles that outlive their context are simply leaked with the backend.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::backend::{FramebufferId, TextureConfig, TextureId};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Release {
    Texture(TextureId),
    Framebuffer(FramebufferId),
}

/// Shared queue of handles awaiting deletion.
#[derive(Debug, Default, Clone)]
pub(crate) struct ReleaseQueue(Rc<RefCell<Vec<Release>>>);

impl ReleaseQueue {
    pub(crate) fn handle(&self) -> Weak<RefCell<Vec<Release>>> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn drain(&self) -> Vec<Release> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

fn enqueue(queue: &Weak<RefCell<Vec<Release>>>, release: Release) {
    if let Some(queue) = queue.upgrade() {
        queue.borrow_mut().push(release);
    }
}

struct TextureInner {
    id: TextureId,
    config: TextureConfig,
    released: Cell<bool>,
    queue: Weak<RefCell<Vec<Release>>>,
}

impl Drop for TextureInner {
    fn drop(&mut self) {
        if !self.released.get() {
            enqueue(&self.queue, Release::Texture(self.id));
        }
    }
}

/// Reference-counted texture handle.
///
/// Clones share the native texture; it is deleted when the last clone drops.
#[derive(Clone)]
pub struct Texture {
    inner: Rc<TextureInner>,
}

impl Texture {
    pub(crate) fn new(id: TextureId, config: TextureConfig, queue: &ReleaseQueue) -> Self {
        Self {
            inner: Rc::new(TextureInner {
                id,
                config,
                released: Cell::new(false),
                queue: queue.handle(),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> TextureId {
        self.inner.id
    }

    #[inline]
    pub fn config(&self) -> TextureConfig {
        self.inner.config
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.inner.config.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.inner.config.height
    }

    /// Whether other handles share this texture.
    #[inline]
    pub fn is_shared(&self) -> bool {
        Rc::strong_count(&self.inner) > 1
    }

    /// Takes over the raw handle; nothing is deleted when the handles drop.
    ///
    /// Applies to every clone. The caller becomes responsible for
    /// `GlContext::destroy_texture`.
    pub fn release(self) -> TextureId {
        self.inner.released.set(true);
        self.inner.id
    }
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.inner.id)
            .field("width", &self.inner.config.width)
            .field("height", &self.inner.config.height)
            .finish()
    }
}

/// Render-to-texture target. Keeps its color texture alive.
#[derive(Debug)]
pub struct Framebuffer {
    id: FramebufferId,
    texture: Texture,
    released: bool,
    queue: Weak<RefCell<Vec<Release>>>,
}

impl Framebuffer {
    pub(crate) fn new(id: FramebufferId, texture: Texture, queue: &ReleaseQueue) -> Self {
        Self {
            id,
            texture,
            released: false,
            queue: queue.handle(),
        }
    }

    #[inline]
    pub fn id(&self) -> FramebufferId {
        self.id
    }

    #[inline]
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    /// Takes over the raw framebuffer handle. The texture stays managed.
    pub fn release(mut self) -> FramebufferId {
        self.released = true;
        self.id
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        if !self.released {
            enqueue(&self.queue, Release::Framebuffer(self.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::backend::FilterMode;

    fn config() -> TextureConfig {
        TextureConfig {
            width: 4,
            height: 4,
            repeat_x: false,
            repeat_y: false,
            filter: FilterMode::Linear,
        }
    }

    #[test]
    fn last_clone_enqueues_once() {
        let queue = ReleaseQueue::default();
        let a = Texture::new(TextureId::new(7), config(), &queue);
        let b = a.clone();
        assert!(a.is_shared());

        drop(a);
        assert!(queue.drain().is_empty());

        drop(b);
        assert_eq!(queue.drain(), vec![Release::Texture(TextureId::new(7))]);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn released_texture_is_not_enqueued() {
        let queue = ReleaseQueue::default();
        let t = Texture::new(TextureId::new(3), config(), &queue);
        assert_eq!(t.release(), TextureId::new(3));
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn framebuffer_releases_before_its_texture() {
        let queue = ReleaseQueue::default();
        let tex = Texture::new(TextureId::new(1), config(), &queue);
        let fb = Framebuffer::new(FramebufferId::new(2), tex, &queue);
        drop(fb);
        assert_eq!(
            queue.drain(),
            vec![Release::Framebuffer(FramebufferId::new(2)), Release::Texture(TextureId::new(1))]
        );
    }

    #[test]
    fn dropping_after_queue_is_gone_is_harmless() {
        let queue = ReleaseQueue::default();
        let t = Texture::new(TextureId::new(5), config(), &queue);
        drop(queue);
        drop(t);
    }
}
