// SPDX-License-Identifier: MIT OR Apache-2.0
//! Glyph ingest records and layout item wrappers.

use coterie_scene::geometry::Point;
use coterie_scene::node::NodeId;
use coterie_scene::SceneHandle;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// A weighted link from one glyph to another, by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    /// Id of the linked glyph
    pub target: String,
    /// Link strength; larger pulls harder in force layouts
    pub strength: f64,
}

impl Link {
    /// Create a link
    pub fn new(target: impl Into<String>, strength: f64) -> Self {
        Self {
            target: target.into(),
            strength,
        }
    }
}

/// A glyph as it enters a layout: an id, a radius, optional links.
///
/// Ids must be unique within a single layout; duplicate ids make link
/// resolution undefined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlyphRecord {
    /// Unique id within one layout
    pub id: String,
    /// Visual radius in pixels
    pub radius: f64,
    /// Weighted links to other glyphs
    #[serde(default)]
    pub links: Vec<Link>,
}

impl GlyphRecord {
    /// Create a record without links
    pub fn new(id: impl Into<String>, radius: f64) -> Self {
        Self {
            id: id.into(),
            radius,
            links: Vec::new(),
        }
    }

    /// Add a link
    pub fn with_link(mut self, target: impl Into<String>, strength: f64) -> Self {
        self.links.push(Link::new(target, strength));
        self
    }
}

/// Physics state a layout keeps per item.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BodyState {
    /// Linear velocity in pixels/second
    pub velocity: Point,
    /// Mass derived from radius and density
    pub mass: f64,
    /// Inverse mass; zero when pinned
    pub inv_mass: f64,
    /// Pinned bodies never move (the king)
    pub pinned: bool,
}

/// A layout's per-glyph bookkeeping.
///
/// The layout owns this wrapper but not the glyph node itself; the node
/// may be shared into a stack's child layouts. Positions are in the
/// layout's local space.
pub struct LayoutItem {
    /// The ingest record
    pub record: GlyphRecord,
    /// The glyph's scene node
    pub node: NodeId,
    /// Current position
    pub position: Point,
    /// Target position after the last placement pass
    pub target: Point,
    pub(crate) body: BodyState,
}

impl LayoutItem {
    pub(crate) fn new(record: GlyphRecord, node: NodeId) -> Self {
        Self {
            record,
            node,
            position: Point::zero(),
            target: Point::zero(),
            body: BodyState::default(),
        }
    }

    /// The glyph's radius
    pub fn radius(&self) -> f64 {
        self.record.radius
    }

    /// The glyph's id
    pub fn id(&self) -> &str {
        &self.record.id
    }
}

/// Shared handle to a layout item.
pub type ItemHandle = Rc<RefCell<LayoutItem>>;

/// Write an item's current position through to its scene node, when the
/// node is still alive.
pub(crate) fn sync_item_to_scene(scene: &SceneHandle, item: &ItemHandle) {
    let item = item.borrow();
    let mut scene = scene.borrow_mut();
    if scene.contains(item.node) {
        scene.set_position_px(item.node, item.position);
    }
}
