//! Layer arena.
//!
//! Layers live in slots addressed by generational [`LayerId`]s. Destroying a
//! layer bumps its slot's generation and pushes the slot on a free list, so
//! stale handles fail lookups instead of aliasing a newer layer.
//!
//! Lookups (`get`, `kind`, `image_mut`, ...) return `None` for stale ids.
//! Mutations that need a live layer (`props_mut`, `add`, `destroy`, ...)
//! panic on a stale id.

use log::debug;

use crate::coords::Vec2;

use super::canvas::CanvasLayer;
use super::id::LayerId;
use super::image::ImageLayer;
use super::immediate::ImmediateLayer;
use super::props::LayerProps;
use super::surface::SurfaceLayer;

/// Ordered children; insertion order is paint order.
#[derive(Debug, Default)]
pub struct GroupLayer {
    pub(crate) children: Vec<LayerId>,
}

impl GroupLayer {
    #[inline]
    pub fn children(&self) -> &[LayerId] {
        &self.children
    }
}

pub enum LayerKind {
    Group(GroupLayer),
    Image(ImageLayer),
    Surface(SurfaceLayer),
    Canvas(CanvasLayer),
    Immediate(ImmediateLayer),
}

impl LayerKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Group(_) => "group",
            Self::Image(_) => "image",
            Self::Surface(_) => "surface",
            Self::Canvas(_) => "canvas",
            Self::Immediate(_) => "immediate",
        }
    }

    /// Hit-testable extent in layer space. Groups and unclipped immediate
    /// layers have none.
    pub fn size(&self) -> Option<Vec2> {
        match self {
            Self::Group(_) => None,
            Self::Image(image) => image.size(),
            Self::Surface(surface) => Some(surface.size()),
            Self::Canvas(canvas) => Some(canvas.size()),
            Self::Immediate(immediate) => immediate.clip_size(),
        }
    }
}

pub(crate) type UpdateHook = Box<dyn FnMut(f32)>;

pub struct LayerNode {
    pub(crate) props: LayerProps,
    pub(crate) parent: Option<LayerId>,
    pub(crate) kind: LayerKind,
    pub(crate) update: Option<UpdateHook>,
}

impl LayerNode {
    #[inline]
    pub fn props(&self) -> &LayerProps {
        &self.props
    }

    #[inline]
    pub fn parent(&self) -> Option<LayerId> {
        self.parent
    }

    #[inline]
    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }
}

struct Slot {
    generation: u32,
    node: Option<LayerNode>,
}

#[derive(Default)]
pub struct LayerTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl LayerTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live layers.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Adds a detached layer with default properties.
    pub fn insert(&mut self, kind: LayerKind) -> LayerId {
        let node = LayerNode {
            props: LayerProps::default(),
            parent: None,
            kind,
            update: None,
        };
        self.len += 1;
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.node = Some(node);
            return LayerId {
                idx,
                generation: slot.generation,
            };
        }
        let idx = u32::try_from(self.slots.len()).unwrap_or_else(|_| panic!("layer arena full"));
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        LayerId { idx, generation: 0 }
    }

    #[inline]
    pub fn contains(&self, id: LayerId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: LayerId) -> Option<&LayerNode> {
        self.slots
            .get(id.idx as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: LayerId) -> Option<&mut LayerNode> {
        self.slots
            .get_mut(id.idx as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn node(&self, id: LayerId) -> &LayerNode {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale {id:?}"),
        }
    }

    fn node_mut(&mut self, id: LayerId) -> &mut LayerNode {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("stale {id:?}"),
        }
    }

    // ── properties and kinds ─────────────────────────────────────────────

    /// # Panics
    /// Panics on a stale id.
    pub fn props(&self, id: LayerId) -> &LayerProps {
        &self.node(id).props
    }

    /// # Panics
    /// Panics on a stale id.
    pub fn props_mut(&mut self, id: LayerId) -> &mut LayerProps {
        &mut self.node_mut(id).props
    }

    pub fn kind(&self, id: LayerId) -> Option<&LayerKind> {
        self.get(id).map(|node| &node.kind)
    }

    pub fn kind_mut(&mut self, id: LayerId) -> Option<&mut LayerKind> {
        self.get_mut(id).map(|node| &mut node.kind)
    }

    pub fn image(&self, id: LayerId) -> Option<&ImageLayer> {
        match self.kind(id)? {
            LayerKind::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn image_mut(&mut self, id: LayerId) -> Option<&mut ImageLayer> {
        match self.kind_mut(id)? {
            LayerKind::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn surface(&self, id: LayerId) -> Option<&SurfaceLayer> {
        match self.kind(id)? {
            LayerKind::Surface(surface) => Some(surface),
            _ => None,
        }
    }

    pub fn canvas_mut(&mut self, id: LayerId) -> Option<&mut CanvasLayer> {
        match self.kind_mut(id)? {
            LayerKind::Canvas(canvas) => Some(canvas),
            _ => None,
        }
    }

    // ── hierarchy ────────────────────────────────────────────────────────

    /// Children of a group in paint order; empty for leaves.
    ///
    /// # Panics
    /// Panics on a stale id.
    pub fn children(&self, id: LayerId) -> &[LayerId] {
        match &self.node(id).kind {
            LayerKind::Group(group) => &group.children,
            _ => &[],
        }
    }

    pub fn parent(&self, id: LayerId) -> Option<LayerId> {
        self.get(id).and_then(|node| node.parent)
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: LayerId, id: LayerId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Appends `child` to `parent`, re-parenting it if needed.
    pub fn add(&mut self, parent: LayerId, child: LayerId) {
        let index = self.children(parent).len();
        self.add_at(parent, index, child);
    }

    /// Inserts `child` at `index` among `parent`'s children (clamped to the end).
    ///
    /// A child already under `parent` is moved; the index refers to the
    /// order after its removal.
    ///
    /// # Panics
    /// Panics on stale ids, when `parent` is not a group, or when `parent`
    /// is `child` or one of its descendants.
    pub fn add_at(&mut self, parent: LayerId, index: usize, child: LayerId) {
        assert!(self.contains(child), "stale {child:?}");
        assert!(
            matches!(self.node(parent).kind, LayerKind::Group(_)),
            "{parent:?} is a {} layer and cannot hold children",
            self.node(parent).kind.name()
        );
        assert!(
            !self.is_ancestor(child, parent),
            "adding {child:?} under {parent:?} would create a cycle"
        );

        self.remove(child);
        if let LayerKind::Group(group) = &mut self.node_mut(parent).kind {
            let index = index.min(group.children.len());
            group.children.insert(index, child);
        }
        self.node_mut(child).parent = Some(parent);
    }

    /// Detaches `child` from its parent. Returns `false` if it had none.
    ///
    /// # Panics
    /// Panics on a stale id.
    pub fn remove(&mut self, child: LayerId) -> bool {
        let Some(parent) = self.node_mut(child).parent.take() else {
            return false;
        };
        if let Some(LayerKind::Group(group)) = self.kind_mut(parent) {
            group.children.retain(|&c| c != child);
        }
        true
    }

    /// Detaches every child of `parent`, leaving them alive.
    pub fn remove_all(&mut self, parent: LayerId) {
        let children = match &mut self.node_mut(parent).kind {
            LayerKind::Group(group) => std::mem::take(&mut group.children),
            _ => return,
        };
        for child in children {
            if let Some(node) = self.get_mut(child) {
                node.parent = None;
            }
        }
    }

    /// Detaches `id` and frees it with its whole subtree.
    ///
    /// Owned GPU resources go to the context's release queue when their last
    /// handle drops. Returns the number of layers freed.
    ///
    /// # Panics
    /// Panics on a stale id, so destroying twice fails fast.
    pub fn destroy(&mut self, id: LayerId) -> usize {
        self.remove(id);
        let mut stack = vec![id];
        let mut freed = 0;
        while let Some(current) = stack.pop() {
            let slot = &mut self.slots[current.idx as usize];
            let Some(node) = slot.node.take() else {
                continue;
            };
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(current.idx);
            self.len -= 1;
            freed += 1;
            if let LayerKind::Group(group) = node.kind {
                stack.extend(group.children);
            }
        }
        debug!("destroyed {freed} layer(s) rooted at {id:?}");
        freed
    }

    // ── update hooks ─────────────────────────────────────────────────────

    /// Installs a per-frame hook receiving the frame delta in seconds.
    pub fn set_update_hook(&mut self, id: LayerId, hook: impl FnMut(f32) + 'static) {
        self.node_mut(id).update = Some(Box::new(hook));
    }

    pub fn clear_update_hook(&mut self, id: LayerId) {
        self.node_mut(id).update = None;
    }

    /// Runs every installed hook, hidden and transparent layers included.
    pub fn update_all(&mut self, dt: f32) {
        for slot in &mut self.slots {
            if let Some(hook) = slot.node.as_mut().and_then(|node| node.update.as_mut()) {
                hook(dt);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::image::ImageSource;
    use std::cell::Cell;
    use std::rc::Rc;

    fn group(tree: &mut LayerTree) -> LayerId {
        tree.insert(LayerKind::Group(GroupLayer::default()))
    }

    #[test]
    fn stale_ids_miss_after_slot_reuse() {
        let mut tree = LayerTree::new();
        let a = group(&mut tree);
        tree.destroy(a);
        let b = group(&mut tree);

        assert_eq!(a.index(), b.index());
        assert!(!tree.contains(a));
        assert!(tree.contains(b));
        assert!(tree.kind(a).is_none());
    }

    #[test]
    #[should_panic(expected = "stale")]
    fn double_destroy_panics() {
        let mut tree = LayerTree::new();
        let a = group(&mut tree);
        tree.destroy(a);
        tree.destroy(a);
    }

    #[test]
    fn add_reparents() {
        let mut tree = LayerTree::new();
        let (p1, p2, c) = (group(&mut tree), group(&mut tree), group(&mut tree));
        tree.add(p1, c);
        tree.add(p2, c);

        assert!(tree.children(p1).is_empty());
        assert_eq!(tree.children(p2), &[c]);
        assert_eq!(tree.parent(c), Some(p2));
    }

    #[test]
    fn add_at_orders_children() {
        let mut tree = LayerTree::new();
        let root = group(&mut tree);
        let (a, b, c) = (group(&mut tree), group(&mut tree), group(&mut tree));
        tree.add(root, a);
        tree.add(root, b);
        tree.add_at(root, 0, c);
        assert_eq!(tree.children(root), &[c, a, b]);

        tree.add_at(root, 99, c);
        assert_eq!(tree.children(root), &[a, b, c]);
    }

    #[test]
    #[should_panic(expected = "cycle")]
    fn adding_ancestor_under_descendant_panics() {
        let mut tree = LayerTree::new();
        let (a, b) = (group(&mut tree), group(&mut tree));
        tree.add(a, b);
        tree.add(b, a);
    }

    #[test]
    #[should_panic(expected = "cannot hold children")]
    fn leaves_cannot_hold_children() {
        let mut tree = LayerTree::new();
        let leaf = tree.insert(LayerKind::Image(ImageLayer::new(ImageSource::Failed)));
        let child = group(&mut tree);
        tree.add(leaf, child);
    }

    #[test]
    fn destroy_frees_subtree_and_detaches() {
        let mut tree = LayerTree::new();
        let root = group(&mut tree);
        let mid = group(&mut tree);
        let leaf = group(&mut tree);
        tree.add(root, mid);
        tree.add(mid, leaf);

        assert_eq!(tree.destroy(mid), 2);
        assert!(tree.children(root).is_empty());
        assert!(!tree.contains(leaf));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn remove_all_keeps_children_alive() {
        let mut tree = LayerTree::new();
        let root = group(&mut tree);
        let (a, b) = (group(&mut tree), group(&mut tree));
        tree.add(root, a);
        tree.add(root, b);
        tree.remove_all(root);

        assert!(tree.children(root).is_empty());
        assert_eq!(tree.parent(a), None);
        assert!(tree.contains(b));
    }

    #[test]
    fn hooks_run_on_hidden_layers() {
        let mut tree = LayerTree::new();
        let a = group(&mut tree);
        tree.props_mut(a).set_visible(false).set_alpha(0.0);

        let total = Rc::new(Cell::new(0.0));
        let sink = Rc::clone(&total);
        tree.set_update_hook(a, move |dt| sink.set(sink.get() + dt));
        tree.update_all(0.25);
        tree.update_all(0.25);

        assert_eq!(total.get(), 0.5);
    }
}
