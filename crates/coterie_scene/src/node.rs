// SPDX-License-Identifier: MIT OR Apache-2.0
//! The scene graph: an arena of reference-counted nodes.
//!
//! Nodes live in a [`Scene`] arena keyed by [`NodeId`]. A node exclusively
//! owns its children through an explicit reference count; the parent link
//! is a plain back-reference used for transform composition and removal,
//! never for lifetime. Ids are random and never reused, so a destroyed
//! node can never be resurrected through a stale handle.
//!
//! Lifecycle violations (retaining a destroyed node, releasing below zero,
//! out-of-range child indices, removing a non-child) are caller bugs and
//! panic immediately. Handlers invoked for scene events receive only the
//! event; they must not call back into the scene synchronously.

use crate::backend::{Backend, Canvas, Color};
use crate::cache::RasterCache;
use crate::event::{Emitter, EmitterHandle, Event};
use crate::geometry::{Bounds, Matrix2D, MatrixStack, Point, Size, GEOM_EPSILON};
use crate::unit::Dim;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use uuid::Uuid;

/// Unique identifier for a scene node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Content drawn by a drawable leaf, in node-local coordinates.
pub trait Drawable {
    /// Draw the content. The canvas transform is already set to the node's
    /// composed matrix; `stack` carries the same composition for children.
    fn draw(&mut self, canvas: &mut dyn Canvas, stack: &mut MatrixStack);

    /// Intrinsic radius of the content, when it has one
    fn natural_radius(&self) -> Option<f64> {
        None
    }
}

/// What a node renders.
pub enum NodeContent {
    /// Pure container: draws nothing of its own
    Group,
    /// Drawable leaf rendered directly every frame
    Leaf(Box<dyn Drawable>),
    /// Drawable leaf rendered through an offscreen raster cache
    Cached {
        /// The content-drawing hook
        drawable: Box<dyn Drawable>,
        /// The raster and its dirty flag
        cache: RasterCache,
    },
}

/// A scene node's attributes and tree links.
pub struct Node {
    position: (Dim, Dim),
    size: (Dim, Dim),
    anchor: (Dim, Dim),
    rotation: f64,
    scale: f64,
    global_scale: f64,
    device_scale: f64,
    alpha: f64,
    local: Matrix2D,
    world: Matrix2D,
    resolved_position: Point,
    resolved_size: Size,
    bounds: Bounds,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    emitter: EmitterHandle,
    content: NodeContent,
}

impl Node {
    fn new(content: NodeContent) -> Self {
        Self {
            position: (Dim::Px(0.0), Dim::Px(0.0)),
            size: (Dim::Px(0.0), Dim::Px(0.0)),
            // Glyphs pivot about their center by default.
            anchor: (Dim::Percent(50.0), Dim::Percent(50.0)),
            rotation: 0.0,
            scale: 1.0,
            global_scale: 1.0,
            device_scale: 1.0,
            alpha: 1.0,
            local: Matrix2D::identity(),
            world: Matrix2D::identity(),
            resolved_position: Point::zero(),
            resolved_size: Size::zero(),
            bounds: Bounds::empty(),
            children: Vec::new(),
            parent: None,
            emitter: Emitter::handle(),
            content,
        }
    }
}

struct Slot {
    refs: u32,
    node: Node,
}

/// Shared handle to a scene.
pub type SceneHandle = Rc<RefCell<Scene>>;

/// The node arena and tree operations.
pub struct Scene {
    nodes: IndexMap<NodeId, Slot>,
    root: NodeId,
    viewport: Size,
    autorelease: Vec<NodeId>,
}

impl Scene {
    /// Create a scene with a root group node sized to the viewport
    pub fn new(viewport: Size) -> Self {
        let root = NodeId::new();
        let mut root_node = Node::new(NodeContent::Group);
        root_node.size = (Dim::Px(viewport.width), Dim::Px(viewport.height));
        root_node.anchor = (Dim::Px(0.0), Dim::Px(0.0));
        let mut nodes = IndexMap::new();
        nodes.insert(
            root,
            Slot {
                refs: 1,
                node: root_node,
            },
        );
        let mut scene = Self {
            nodes,
            root,
            viewport,
            autorelease: Vec::new(),
        };
        scene.refresh_transforms(root);
        scene
    }

    /// Create a shared scene handle
    pub fn handle(viewport: Size) -> SceneHandle {
        Rc::new(RefCell::new(Self::new(viewport)))
    }

    /// The root node
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Whether a node is alive
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of live nodes (including the root)
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn slot(&self, id: NodeId) -> &Slot {
        self.nodes
            .get(&id)
            .unwrap_or_else(|| panic!("node {:?} is destroyed or unknown to this scene", id))
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut Slot {
        self.nodes
            .get_mut(&id)
            .unwrap_or_else(|| panic!("node {:?} is destroyed or unknown to this scene", id))
    }

    // -- creation and lifecycle -------------------------------------------

    /// Create an unparented group node with reference count 1
    pub fn create_group(&mut self) -> NodeId {
        self.insert(Node::new(NodeContent::Group))
    }

    /// Create an unparented drawable leaf with reference count 1
    pub fn create_leaf(&mut self, drawable: Box<dyn Drawable>) -> NodeId {
        self.insert(Node::new(NodeContent::Leaf(drawable)))
    }

    /// Create an unparented raster-cached leaf with reference count 1
    pub fn create_cached(&mut self, drawable: Box<dyn Drawable>) -> NodeId {
        self.insert(Node::new(NodeContent::Cached {
            drawable,
            cache: RasterCache::new(),
        }))
    }

    fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId::new();
        self.nodes.insert(id, Slot { refs: 1, node });
        self.refresh_transforms(id);
        id
    }

    /// Increment a node's reference count.
    ///
    /// Panics when the node was already destroyed; a destroyed node can
    /// never be resurrected.
    pub fn retain(&mut self, id: NodeId) {
        self.slot_mut(id).refs += 1;
    }

    /// Decrement a node's reference count, tearing it down at zero.
    ///
    /// Panics on a destroyed or unknown id (an over-release).
    pub fn release(&mut self, id: NodeId) {
        let remaining = {
            let slot = self.slot_mut(id);
            slot.refs -= 1;
            slot.refs
        };
        if remaining == 0 {
            self.teardown(id);
        }
    }

    /// Defer one release to the end of the current tick.
    ///
    /// Lets a freshly created, unparented node survive the current turn
    /// until some owner retains it.
    pub fn autorelease(&mut self, id: NodeId) {
        assert!(
            self.contains(id),
            "autorelease of destroyed or unknown node {:?}",
            id
        );
        self.autorelease.push(id);
    }

    /// Apply all deferred releases. Called once per tick, after drawing.
    pub fn drain_autorelease(&mut self) {
        let pending = std::mem::take(&mut self.autorelease);
        if !pending.is_empty() {
            tracing::trace!(count = pending.len(), "draining autorelease pool");
        }
        for id in pending {
            self.release(id);
        }
    }

    /// Current reference count of a live node
    pub fn ref_count(&self, id: NodeId) -> u32 {
        self.slot(id).refs
    }

    fn teardown(&mut self, id: NodeId) {
        // Remove the slot first: any retain/release during teardown hits a
        // missing id and fails loudly instead of resurrecting the node.
        let node = self
            .nodes
            .shift_remove(&id)
            .expect("teardown of missing slot")
            .node;

        if let Some(parent) = node.parent {
            if self.contains(parent) {
                let parent_emitter = {
                    let pslot = self.slot_mut(parent);
                    pslot.node.children.retain(|c| *c != id);
                    pslot.node.emitter.clone()
                };
                Emitter::emit(
                    &parent_emitter,
                    &Event::with_payload(
                        "child-removed",
                        serde_json::json!({ "child": id.0.to_string() }),
                    ),
                );
            }
        }

        for child in node.children {
            if self.contains(child) {
                self.slot_mut(child).node.parent = None;
                self.release(child);
            }
        }

        Emitter::emit(&node.emitter, &Event::new("destroyed"));
    }

    // -- tree operations --------------------------------------------------

    /// Attach `child` under `parent` at `index` (append when `None`).
    ///
    /// Retains the child, detaches it from any prior parent, resolves its
    /// transforms against the new parent and emits `child-added` on the
    /// parent. Panics when the index is beyond the child list.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
        assert!(parent != child, "a node cannot be its own child");
        assert!(self.contains(parent), "add_child: parent is destroyed");

        self.retain(child);
        let old_parent = self.slot(child).node.parent;
        if let Some(old) = old_parent {
            self.detach(old, child);
            self.release(child);
        }

        let len = self.slot(parent).node.children.len();
        let at = index.unwrap_or(len);
        assert!(
            at <= len,
            "add_child: index {at} out of bounds for {len} children"
        );
        self.slot_mut(parent).node.children.insert(at, child);
        self.slot_mut(child).node.parent = Some(parent);
        self.refresh_transforms(child);

        let emitter = self.slot(parent).node.emitter.clone();
        Emitter::emit(
            &emitter,
            &Event::with_payload(
                "child-added",
                serde_json::json!({ "child": child.0.to_string() }),
            ),
        );
    }

    /// Detach and release the child at `index`. Panics when out of range.
    pub fn remove_child_at(&mut self, parent: NodeId, index: usize) -> NodeId {
        let len = self.slot(parent).node.children.len();
        assert!(
            index < len,
            "remove_child_at: index {index} out of bounds for {len} children"
        );
        let child = self.slot(parent).node.children[index];
        self.detach(parent, child);

        let emitter = self.slot(parent).node.emitter.clone();
        Emitter::emit(
            &emitter,
            &Event::with_payload(
                "child-removed",
                serde_json::json!({ "child": child.0.to_string() }),
            ),
        );
        self.release(child);
        child
    }

    /// Detach and release a specific child. Panics when `child` is not a
    /// child of `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        let index = self
            .slot(parent)
            .node
            .children
            .iter()
            .position(|c| *c == child)
            .unwrap_or_else(|| panic!("remove_child: {:?} is not a child of {:?}", child, parent));
        self.remove_child_at(parent, index);
    }

    fn detach(&mut self, parent: NodeId, child: NodeId) {
        self.slot_mut(parent).node.children.retain(|c| *c != child);
        self.slot_mut(child).node.parent = None;
    }

    /// The node's children, in draw order
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.slot(id).node.children.clone()
    }

    /// The node's parent, when attached
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).node.parent
    }

    /// The node's event emitter
    pub fn emitter(&self, id: NodeId) -> EmitterHandle {
        self.slot(id).node.emitter.clone()
    }

    // -- attribute setters ------------------------------------------------

    /// Set the node position. Never dirties a raster cache.
    pub fn set_position(&mut self, id: NodeId, x: Dim, y: Dim) {
        self.slot_mut(id).node.position = (x, y);
        self.refresh_transforms(id);
    }

    /// Set the node position in absolute pixels
    pub fn set_position_px(&mut self, id: NodeId, p: Point) {
        self.set_position(id, Dim::Px(p.x), Dim::Px(p.y));
    }

    /// Set the node size. Dirties the raster cache.
    pub fn set_size(&mut self, id: NodeId, width: Dim, height: Dim) {
        {
            let node = &mut self.slot_mut(id).node;
            node.size = (width, height);
            if let NodeContent::Cached { cache, .. } = &mut node.content {
                cache.mark_dirty();
            }
        }
        self.refresh_transforms(id);
    }

    /// Set the anchor (pivot)
    pub fn set_anchor(&mut self, id: NodeId, x: Dim, y: Dim) {
        self.slot_mut(id).node.anchor = (x, y);
        self.refresh_transforms(id);
    }

    /// Set the rotation in radians
    pub fn set_rotation(&mut self, id: NodeId, radians: f64) {
        self.slot_mut(id).node.rotation = radians;
        self.refresh_transforms(id);
    }

    /// Set the local scale
    pub fn set_scale(&mut self, id: NodeId, scale: f64) {
        self.slot_mut(id).node.scale = scale;
        self.refresh_transforms(id);
    }

    /// Set the node alpha (multiplied down the subtree at draw time)
    pub fn set_alpha(&mut self, id: NodeId, alpha: f64) {
        self.slot_mut(id).node.alpha = alpha.clamp(0.0, 1.0);
    }

    /// Set the device pixel scale. Dirties the raster cache.
    pub fn set_device_scale(&mut self, id: NodeId, scale: f64) {
        let node = &mut self.slot_mut(id).node;
        node.device_scale = scale;
        if let NodeContent::Cached { cache, .. } = &mut node.content {
            cache.mark_dirty();
        }
    }

    /// Set the inherited global scale on a whole subtree. Dirties every
    /// raster cache in the subtree.
    pub fn set_global_scale(&mut self, id: NodeId, scale: f64) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let node = &mut self.slot_mut(current).node;
            node.global_scale = scale;
            if let NodeContent::Cached { cache, .. } = &mut node.content {
                cache.mark_dirty();
            }
            pending.extend(node.children.iter().copied());
        }
    }

    /// Request a redraw of content whose pixels changed independent of any
    /// transform. Dirties the raster cache and emits `needs-redraw`.
    pub fn request_redraw(&mut self, id: NodeId) {
        let emitter = {
            let node = &mut self.slot_mut(id).node;
            if let NodeContent::Cached { cache, .. } = &mut node.content {
                cache.mark_dirty();
            }
            node.emitter.clone()
        };
        Emitter::emit(&emitter, &Event::new("needs-redraw"));
    }

    // -- attribute getters ------------------------------------------------

    /// Resolved position in parent-space pixels
    pub fn position_px(&self, id: NodeId) -> Point {
        self.slot(id).node.resolved_position
    }

    /// Resolved size in pixels
    pub fn size_px(&self, id: NodeId) -> Size {
        self.slot(id).node.resolved_size
    }

    /// Rotation in radians
    pub fn rotation(&self, id: NodeId) -> f64 {
        self.slot(id).node.rotation
    }

    /// Local scale
    pub fn scale(&self, id: NodeId) -> f64 {
        self.slot(id).node.scale
    }

    /// Node alpha
    pub fn alpha(&self, id: NodeId) -> f64 {
        self.slot(id).node.alpha
    }

    /// Inherited global scale
    pub fn global_scale(&self, id: NodeId) -> f64 {
        self.slot(id).node.global_scale
    }

    /// Device pixel scale
    pub fn device_scale(&self, id: NodeId) -> f64 {
        self.slot(id).node.device_scale
    }

    /// Composed world matrix as of the last recomputation
    pub fn world_matrix(&self, id: NodeId) -> Matrix2D {
        self.slot(id).node.world
    }

    /// Local matrix as of the last recomputation
    pub fn local_matrix(&self, id: NodeId) -> Matrix2D {
        self.slot(id).node.local
    }

    /// World-space bounding box of the node's resolved rectangle
    pub fn bounds(&self, id: NodeId) -> Bounds {
        self.slot(id).node.bounds
    }

    /// Whether the node's raster cache is currently dirty. `None` for
    /// uncached nodes.
    pub fn cache_dirty(&self, id: NodeId) -> Option<bool> {
        match &self.slot(id).node.content {
            NodeContent::Cached { cache, .. } => Some(cache.is_dirty()),
            _ => None,
        }
    }

    /// Radius contract of a drawable leaf: the content's natural radius,
    /// falling back to half the resolved diagonal.
    pub fn safe_radius(&self, id: NodeId) -> f64 {
        let node = &self.slot(id).node;
        let natural = match &node.content {
            NodeContent::Leaf(drawable) => drawable.natural_radius(),
            NodeContent::Cached { drawable, .. } => drawable.natural_radius(),
            NodeContent::Group => None,
        };
        natural.unwrap_or_else(|| node.resolved_size.diagonal() * 0.5)
    }

    /// Resize the viewport the root resolves against
    pub fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
        let root = self.root;
        self.slot_mut(root).node.size = (Dim::Px(viewport.width), Dim::Px(viewport.height));
        self.refresh_transforms(root);
    }

    // -- transforms -------------------------------------------------------

    /// Recompute a node's matrices from its attributes and its parent's
    /// resolved size, then propagate to children when anything changed.
    fn refresh_transforms(&mut self, id: NodeId) {
        let (parent_size, parent_world) = match self.slot(id).node.parent {
            Some(p) => {
                let pn = &self.slot(p).node;
                (pn.resolved_size, pn.world)
            }
            None => (self.viewport, Matrix2D::identity()),
        };

        let (changed, children) = {
            let node = &mut self.slot_mut(id).node;
            let resolved_position = Point::new(
                node.position.0.resolve(parent_size.width),
                node.position.1.resolve(parent_size.height),
            );
            let resolved_size = Size::new(
                node.size.0.resolve(parent_size.width),
                node.size.1.resolve(parent_size.height),
            );
            let anchor = Point::new(
                node.anchor.0.resolve(resolved_size.width),
                node.anchor.1.resolve(resolved_size.height),
            );

            let local = Matrix2D::translation(resolved_position.x, resolved_position.y)
                .multiply(&Matrix2D::rotation(node.rotation))
                .multiply(&Matrix2D::scaling(node.scale, node.scale))
                .multiply(&Matrix2D::translation(-anchor.x, -anchor.y));
            let world = parent_world.multiply(&local);
            debug_assert!(world.is_finite(), "non-finite matrix for node {:?}", id);

            let corners = [
                world.apply(Point::zero()),
                world.apply(Point::new(resolved_size.width, 0.0)),
                world.apply(Point::new(resolved_size.width, resolved_size.height)),
                world.apply(Point::new(0.0, resolved_size.height)),
            ];

            let changed = world != node.world || resolved_size != node.resolved_size;
            node.resolved_position = resolved_position;
            node.resolved_size = resolved_size;
            node.local = local;
            node.world = world;
            node.bounds = Bounds::from_points(&corners);
            (changed, node.children.clone())
        };

        if changed {
            for child in children {
                self.refresh_transforms(child);
            }
        }
    }

    /// Map a node-local point to world space by composing the ancestor
    /// chain top-down. O(depth); scene depth stays shallow.
    pub fn local_to_global(&self, id: NodeId, p: Point) -> Point {
        self.chain_matrix(id).apply(p)
    }

    /// Map a world-space point into a node's local space.
    ///
    /// Falls back to the untransformed point when the chain is singular
    /// (e.g. a zero scale somewhere above), so NaN never escapes.
    pub fn global_to_local(&self, id: NodeId, p: Point) -> Point {
        match self.chain_matrix(id).invert() {
            Some(inverse) => inverse.apply(p),
            None => p,
        }
    }

    fn chain_matrix(&self, id: NodeId) -> Matrix2D {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(n) = current {
            chain.push(n);
            current = self.slot(n).node.parent;
        }
        let mut m = Matrix2D::identity();
        for n in chain.iter().rev() {
            m = m.multiply(&self.slot(*n).node.local);
        }
        m
    }

    // -- drawing ----------------------------------------------------------

    /// Draw the whole tree: redraw dirty caches, blit clean ones, draw
    /// leaves, children in order under a shared matrix stack.
    pub fn draw(&mut self, canvas: &mut dyn Canvas, backend: &mut dyn Backend) {
        let root = self.root;
        self.refresh_transforms(root);
        let mut stack = MatrixStack::new();
        self.draw_node(root, canvas, backend, &mut stack, 1.0);
    }

    fn draw_node(
        &mut self,
        id: NodeId,
        canvas: &mut dyn Canvas,
        backend: &mut dyn Backend,
        stack: &mut MatrixStack,
        inherited_alpha: f64,
    ) {
        let (local, node_alpha, children, device_scale, global_scale, resolved_size) = {
            let node = &self.slot(id).node;
            (
                node.local,
                node.alpha,
                node.children.clone(),
                node.device_scale,
                node.global_scale,
                node.resolved_size,
            )
        };
        let alpha = inherited_alpha * node_alpha;
        if alpha <= 0.0 {
            return;
        }

        stack.push(&local);
        canvas.set_transform(stack.current());
        canvas.set_alpha(alpha);

        // The content is taken out of the slot for the duration of its own
        // draw call; drawables only see the canvas and the matrix stack.
        let mut content = std::mem::replace(&mut self.slot_mut(id).node.content, NodeContent::Group);
        match &mut content {
            NodeContent::Group => {}
            NodeContent::Leaf(drawable) => drawable.draw(canvas, stack),
            NodeContent::Cached { drawable, cache } => {
                let raster_scale = (device_scale * global_scale).max(GEOM_EPSILON);
                let width = (resolved_size.width * raster_scale).ceil().max(1.0) as u32;
                let height = (resolved_size.height * raster_scale).ceil().max(1.0) as u32;

                cache.ensure_layer(backend, width, height);
                if cache.is_dirty() {
                    {
                        let layer = cache.ensure_layer(backend, width, height);
                        let offscreen = layer.canvas();
                        offscreen.clear(Color::TRANSPARENT);
                        offscreen.set_alpha(1.0);
                        offscreen.set_transform(Matrix2D::scaling(raster_scale, raster_scale));
                        let mut offscreen_stack = MatrixStack::new();
                        drawable.draw(offscreen, &mut offscreen_stack);
                    }
                    cache.mark_clean();
                }
                if let Some(layer) = cache.layer() {
                    let inverse = 1.0 / raster_scale;
                    let blit = stack.current().multiply(&Matrix2D::scaling(inverse, inverse));
                    canvas.blit(layer, blit, alpha);
                }
            }
        }
        self.slot_mut(id).node.content = content;

        for child in children {
            if self.contains(child) {
                self.draw_node(child, canvas, backend, stack, alpha);
            }
        }
        stack.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DrawOp, RecordingBackend, RecordingCanvas};
    use crate::event::Flow;
    use std::cell::Cell;

    struct DiscGlyph {
        radius: f64,
    }

    impl Drawable for DiscGlyph {
        fn draw(&mut self, canvas: &mut dyn Canvas, _stack: &mut MatrixStack) {
            canvas.begin_path();
            canvas.arc(Point::zero(), self.radius, 0.0, std::f64::consts::TAU);
            canvas.fill(Color::WHITE);
        }

        fn natural_radius(&self) -> Option<f64> {
            Some(self.radius)
        }
    }

    fn scene() -> Scene {
        Scene::new(Size::new(800.0, 600.0))
    }

    #[test]
    fn retain_release_pairs_leave_count_unchanged() {
        let mut scene = scene();
        let node = scene.create_group();
        assert_eq!(scene.ref_count(node), 1);
        scene.retain(node);
        scene.release(node);
        assert_eq!(scene.ref_count(node), 1);
        assert!(scene.contains(node));
    }

    #[test]
    fn teardown_fires_exactly_once_after_matching_releases() {
        let mut scene = scene();
        let node = scene.create_group();
        let destroyed = std::rc::Rc::new(Cell::new(0));

        let counter = destroyed.clone();
        scene.emitter(node).borrow_mut().on(Some("destroyed"), move |_| {
            counter.set(counter.get() + 1);
            Flow::Continue
        });

        for _ in 0..3 {
            scene.retain(node);
        }
        for _ in 0..3 {
            scene.release(node);
            assert!(scene.contains(node));
            assert_eq!(destroyed.get(), 0);
        }
        scene.release(node);
        assert!(!scene.contains(node));
        assert_eq!(destroyed.get(), 1);
    }

    #[test]
    #[should_panic(expected = "destroyed or unknown")]
    fn release_after_teardown_panics() {
        let mut scene = scene();
        let node = scene.create_group();
        scene.release(node);
        scene.release(node);
    }

    #[test]
    #[should_panic(expected = "destroyed or unknown")]
    fn retain_destroyed_node_panics() {
        let mut scene = scene();
        let node = scene.create_group();
        scene.release(node);
        scene.retain(node);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn add_child_out_of_range_index_panics() {
        let mut scene = scene();
        let root = scene.root();
        let node = scene.create_group();
        scene.add_child(root, node, Some(5));
    }

    #[test]
    #[should_panic(expected = "not a child")]
    fn remove_non_child_panics() {
        let mut scene = scene();
        let root = scene.root();
        let node = scene.create_group();
        scene.remove_child(root, node);
    }

    #[test]
    fn add_child_transfers_ownership_between_parents() {
        let mut scene = scene();
        let root = scene.root();
        let first = scene.create_group();
        let second = scene.create_group();
        scene.add_child(root, first, None);
        scene.add_child(root, second, None);

        let node = scene.create_group();
        scene.add_child(first, node, None);
        assert_eq!(scene.ref_count(node), 2);

        scene.add_child(second, node, None);
        assert_eq!(scene.ref_count(node), 2);
        assert_eq!(scene.parent(node), Some(second));
        assert!(scene.children(first).is_empty());
    }

    #[test]
    fn removing_sole_owner_cascades_to_children() {
        let mut scene = scene();
        let root = scene.root();
        let parent = scene.create_group();
        let child = scene.create_group();
        scene.add_child(root, parent, None);
        scene.add_child(parent, child, None);

        // Drop creation references: the tree is now the only owner.
        scene.release(parent);
        scene.release(child);
        assert!(scene.contains(child));

        scene.remove_child(root, parent);
        assert!(!scene.contains(parent));
        assert!(!scene.contains(child));
    }

    #[test]
    fn autorelease_defers_one_release_to_drain() {
        let mut scene = scene();
        let node = scene.create_group();
        scene.autorelease(node);
        assert!(scene.contains(node));
        scene.drain_autorelease();
        assert!(!scene.contains(node));
    }

    #[test]
    fn autoreleased_node_survives_when_retained_by_a_parent() {
        let mut scene = scene();
        let root = scene.root();
        let node = scene.create_group();
        scene.autorelease(node);
        scene.add_child(root, node, None);
        scene.drain_autorelease();
        assert!(scene.contains(node));
        assert_eq!(scene.ref_count(node), 1);
    }

    #[test]
    fn local_to_global_composes_parent_chain() {
        let mut scene = scene();
        let root = scene.root();
        let parent = scene.create_group();
        let child = scene.create_group();
        scene.add_child(root, parent, None);
        scene.add_child(parent, child, None);

        scene.set_position(parent, Dim::Px(100.0), Dim::Px(100.0));
        scene.set_scale(parent, 2.0);
        scene.set_position(child, Dim::Px(10.0), Dim::Px(10.0));

        let p = scene.local_to_global(child, Point::zero());
        assert!((p.x - 120.0).abs() < 1e-9);
        assert!((p.y - 120.0).abs() < 1e-9);
    }

    #[test]
    fn global_local_round_trip_under_arbitrary_transforms() {
        let mut scene = scene();
        let root = scene.root();
        let parent = scene.create_group();
        let child = scene.create_group();
        scene.add_child(root, parent, None);
        scene.add_child(parent, child, None);

        scene.set_position(parent, Dim::Px(37.5), Dim::Px(-12.0));
        scene.set_rotation(parent, 0.81);
        scene.set_scale(parent, 1.7);
        scene.set_position(child, Dim::Px(-4.0), Dim::Px(9.0));
        scene.set_rotation(child, -2.2);
        scene.set_scale(child, 0.4);

        let original = Point::new(55.0, -21.0);
        let round = scene.global_to_local(child, scene.local_to_global(child, original));
        assert!((round.x - original.x).abs() < 1e-6);
        assert!((round.y - original.y).abs() < 1e-6);
    }

    #[test]
    fn percent_units_resolve_against_parent_size() {
        let mut scene = scene();
        let root = scene.root();
        let parent = scene.create_group();
        let child = scene.create_group();
        scene.add_child(root, parent, None);
        scene.add_child(parent, child, None);

        scene.set_size(parent, Dim::Px(200.0), Dim::Px(100.0));
        scene.set_size(child, Dim::Percent(50.0), Dim::Percent(50.0));
        scene.set_position(child, Dim::Percent(100.0), Dim::Percent(100.0));

        assert_eq!(scene.size_px(child), Size::new(100.0, 50.0));
        assert_eq!(scene.position_px(child), Point::new(200.0, 100.0));
    }

    #[test]
    fn parent_resize_re_resolves_percent_children() {
        let mut scene = scene();
        let root = scene.root();
        let parent = scene.create_group();
        let child = scene.create_group();
        scene.add_child(root, parent, None);
        scene.add_child(parent, child, None);

        scene.set_size(parent, Dim::Px(200.0), Dim::Px(100.0));
        scene.set_size(child, Dim::Percent(50.0), Dim::Percent(50.0));
        scene.set_size(parent, Dim::Px(400.0), Dim::Px(100.0));
        assert_eq!(scene.size_px(child), Size::new(200.0, 50.0));
    }

    #[test]
    fn position_moves_do_not_dirty_the_cache() {
        let mut scene = scene();
        let root = scene.root();
        let node = scene.create_cached(Box::new(DiscGlyph { radius: 20.0 }));
        scene.add_child(root, node, None);
        scene.set_size(node, Dim::Px(40.0), Dim::Px(40.0));

        let mut canvas = RecordingCanvas::new();
        let mut backend = RecordingBackend::default();
        scene.draw(&mut canvas, &mut backend);
        assert_eq!(scene.cache_dirty(node), Some(false));

        scene.set_position_px(node, Point::new(300.0, 120.0));
        assert_eq!(scene.cache_dirty(node), Some(false));

        scene.draw(&mut canvas, &mut backend);
        assert_eq!(backend.layers_created, 1);
        assert_eq!(canvas.count(|op| matches!(op, DrawOp::Blit { .. })), 2);
    }

    #[test]
    fn scale_affecting_changes_dirty_the_cache() {
        let mut scene = scene();
        let root = scene.root();
        let node = scene.create_cached(Box::new(DiscGlyph { radius: 20.0 }));
        scene.add_child(root, node, None);
        scene.set_size(node, Dim::Px(40.0), Dim::Px(40.0));

        let mut canvas = RecordingCanvas::new();
        let mut backend = RecordingBackend::default();
        scene.draw(&mut canvas, &mut backend);

        scene.set_size(node, Dim::Px(80.0), Dim::Px(80.0));
        assert_eq!(scene.cache_dirty(node), Some(true));
        scene.draw(&mut canvas, &mut backend);

        scene.set_device_scale(node, 2.0);
        assert_eq!(scene.cache_dirty(node), Some(true));
        scene.draw(&mut canvas, &mut backend);

        scene.set_global_scale(node, 3.0);
        assert_eq!(scene.cache_dirty(node), Some(true));

        scene.request_redraw(node);
        assert_eq!(scene.cache_dirty(node), Some(true));
    }

    #[test]
    fn global_scale_propagates_to_descendants() {
        let mut scene = scene();
        let root = scene.root();
        let group = scene.create_group();
        let leaf = scene.create_cached(Box::new(DiscGlyph { radius: 5.0 }));
        scene.add_child(root, group, None);
        scene.add_child(group, leaf, None);

        scene.set_global_scale(group, 2.5);
        assert_eq!(scene.global_scale(leaf), 2.5);
        assert_eq!(scene.cache_dirty(leaf), Some(true));
    }

    #[test]
    fn draw_emits_leaf_content_in_child_order() {
        let mut scene = scene();
        let root = scene.root();
        let a = scene.create_leaf(Box::new(DiscGlyph { radius: 10.0 }));
        let b = scene.create_leaf(Box::new(DiscGlyph { radius: 20.0 }));
        scene.add_child(root, a, None);
        scene.add_child(root, b, Some(0));

        let mut canvas = RecordingCanvas::new();
        let mut backend = RecordingBackend::default();
        scene.draw(&mut canvas, &mut backend);

        let radii: Vec<f64> = canvas
            .ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Arc { radius, .. } => Some(*radius),
                _ => None,
            })
            .collect();
        assert_eq!(radii, vec![20.0, 10.0]);
    }

    #[test]
    fn safe_radius_prefers_natural_radius() {
        let mut scene = scene();
        let leaf = scene.create_leaf(Box::new(DiscGlyph { radius: 17.0 }));
        assert_eq!(scene.safe_radius(leaf), 17.0);

        let group = scene.create_group();
        scene.set_size(group, Dim::Px(30.0), Dim::Px(40.0));
        assert_eq!(scene.safe_radius(group), 25.0);
    }
}
