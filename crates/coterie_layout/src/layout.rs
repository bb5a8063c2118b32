// SPDX-License-Identifier: MIT OR Apache-2.0
//! The layout dispatch: interchangeable placement algorithms behind one
//! tagged union.

use crate::graph_force::GraphForceLayout;
use crate::item::{sync_item_to_scene, GlyphRecord, ItemHandle, LayoutItem};
use crate::orbital::OrbitalLayout;
use crate::physical::PhysicalLayout;
use coterie_motion::{ContextId, Easing, Scheduler, Tween, TweenId};
use coterie_scene::geometry::Point;
use coterie_scene::node::NodeId;
use coterie_scene::SceneHandle;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Duration of the shared placement tween, in seconds
pub const POSITION_DURATION: f64 = 0.6;

/// Named layout algorithm kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LayoutKind {
    /// Radial ring packing
    #[default]
    Orbital,
    /// Continuous body simulation around a pinned king
    Physical,
    /// Force-directed weighted link graph
    GraphForce,
}

/// Error rejecting a glyph at insertion time
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    /// The record's radius is unusable for placement
    #[error("glyph {id:?} has no usable radius ({radius})")]
    InvalidRadius {
        /// Offending glyph id
        id: String,
        /// The rejected radius value
        radius: f64,
    },
}

/// Behavior shared by every placement algorithm.
pub trait LayoutAlgorithm {
    /// Wrap a glyph into the layout. Rejects records without a usable
    /// radius.
    fn add_item(&mut self, record: GlyphRecord, node: NodeId) -> Result<ItemHandle, LayoutError>;

    /// Remove the item with the given id, returning its wrapper
    fn remove_item(&mut self, id: &str) -> Option<ItemHandle>;

    /// Remove every item
    fn remove_all_items(&mut self);

    /// The item registry, in insertion order
    fn items(&self) -> &[ItemHandle];

    /// Compute target positions for every item
    fn compute_targets(&mut self);

    /// Advance continuous simulation, when the algorithm has one
    fn step(&mut self, _dt: f64) {}

    /// Fast-forward continuous simulation until it settles (bounded)
    fn settle(&mut self) {}

    /// Radius of the smallest circle around the layout center containing
    /// every placed item
    fn bounding_radius(&self) -> f64;

    /// The layout's local center
    fn center(&self) -> Point;

    /// Move the layout's local center
    fn set_center(&mut self, center: Point);
}

pub(crate) fn validate_record(record: &GlyphRecord) -> Result<(), LayoutError> {
    if !record.radius.is_finite() || record.radius <= 0.0 {
        return Err(LayoutError::InvalidRadius {
            id: record.id.clone(),
            radius: record.radius,
        });
    }
    Ok(())
}

pub(crate) fn make_item(
    items: &[ItemHandle],
    record: GlyphRecord,
    node: NodeId,
) -> Result<ItemHandle, LayoutError> {
    validate_record(&record)?;
    if items.iter().any(|i| i.borrow().record.id == record.id) {
        tracing::warn!(id = %record.id, "duplicate glyph id; link resolution is undefined");
    }
    Ok(Rc::new(RefCell::new(LayoutItem::new(record, node))))
}

/// A placement algorithm plus the shared animation flow.
///
/// Kinds are represented as a tagged union so a stack can swap the
/// algorithm at runtime by rebuilding; `Custom` carries a caller-supplied
/// implementation.
pub enum Layout {
    /// Radial ring packing
    Orbital(OrbitalLayout),
    /// Continuous body simulation
    Physical(PhysicalLayout),
    /// Force-directed link graph
    GraphForce(GraphForceLayout),
    /// Caller-supplied algorithm
    Custom(Box<dyn LayoutAlgorithm>),
}

impl Layout {
    /// Build a layout of the named kind with default tuning
    pub fn from_kind(kind: LayoutKind) -> Self {
        match kind {
            LayoutKind::Orbital => Layout::Orbital(OrbitalLayout::new()),
            LayoutKind::Physical => Layout::Physical(PhysicalLayout::new()),
            LayoutKind::GraphForce => Layout::GraphForce(GraphForceLayout::new()),
        }
    }

    /// The named kind, or `None` for a custom layout
    pub fn kind(&self) -> Option<LayoutKind> {
        match self {
            Layout::Orbital(_) => Some(LayoutKind::Orbital),
            Layout::Physical(_) => Some(LayoutKind::Physical),
            Layout::GraphForce(_) => Some(LayoutKind::GraphForce),
            Layout::Custom(_) => None,
        }
    }

    fn algorithm(&self) -> &dyn LayoutAlgorithm {
        match self {
            Layout::Orbital(l) => l,
            Layout::Physical(l) => l,
            Layout::GraphForce(l) => l,
            Layout::Custom(l) => l.as_ref(),
        }
    }

    fn algorithm_mut(&mut self) -> &mut dyn LayoutAlgorithm {
        match self {
            Layout::Orbital(l) => l,
            Layout::Physical(l) => l,
            Layout::GraphForce(l) => l,
            Layout::Custom(l) => l.as_mut(),
        }
    }

    /// See [`LayoutAlgorithm::add_item`]
    pub fn add_item(
        &mut self,
        record: GlyphRecord,
        node: NodeId,
    ) -> Result<ItemHandle, LayoutError> {
        self.algorithm_mut().add_item(record, node)
    }

    /// See [`LayoutAlgorithm::remove_item`]
    pub fn remove_item(&mut self, id: &str) -> Option<ItemHandle> {
        self.algorithm_mut().remove_item(id)
    }

    /// See [`LayoutAlgorithm::remove_all_items`]
    pub fn remove_all_items(&mut self) {
        self.algorithm_mut().remove_all_items();
    }

    /// See [`LayoutAlgorithm::items`]
    pub fn items(&self) -> &[ItemHandle] {
        self.algorithm().items()
    }

    /// See [`LayoutAlgorithm::compute_targets`]
    pub fn compute_targets(&mut self) {
        self.algorithm_mut().compute_targets();
    }

    /// See [`LayoutAlgorithm::step`]
    pub fn step(&mut self, dt: f64) {
        self.algorithm_mut().step(dt);
    }

    /// See [`LayoutAlgorithm::bounding_radius`]
    pub fn bounding_radius(&self) -> f64 {
        self.algorithm().bounding_radius()
    }

    /// See [`LayoutAlgorithm::center`]
    pub fn center(&self) -> Point {
        self.algorithm().center()
    }

    /// See [`LayoutAlgorithm::set_center`]
    pub fn set_center(&mut self, center: Point) {
        self.algorithm_mut().set_center(center);
    }

    /// Drain every item back into `(record, node)` pairs, in insertion
    /// order. Used when the layout kind changes and items must be re-added
    /// to a rebuilt layout.
    pub fn take_records(&mut self) -> Vec<(GlyphRecord, NodeId)> {
        let pairs: Vec<(GlyphRecord, NodeId)> = self
            .items()
            .iter()
            .map(|item| {
                let item = item.borrow();
                (item.record.clone(), item.node)
            })
            .collect();
        self.remove_all_items();
        pairs
    }

    /// Write every item's current position through to its scene node
    pub fn sync_to_scene(&self, scene: &SceneHandle) {
        for item in self.items() {
            sync_item_to_scene(scene, item);
        }
    }

    /// Place every item.
    ///
    /// Computes target positions, then either snaps items into place
    /// (`animated == false`) or starts one shared tween lerping every item
    /// from its current to its target position so all items arrive in
    /// unison. The physical variant is special-cased: its simulation is
    /// the animation, so an animated request only (re)runs the simulation,
    /// while a non-animated request fast-forwards it until it settles.
    pub fn position_items(
        &mut self,
        animated: bool,
        scheduler: &mut Scheduler,
        scene: &SceneHandle,
        context: ContextId,
    ) -> Option<TweenId> {
        if self.items().is_empty() {
            return None;
        }

        if let Layout::Physical(physical) = self {
            if !animated {
                physical.settle();
            }
            self.sync_to_scene(scene);
            return None;
        }

        self.algorithm_mut().compute_targets();
        let items: Vec<ItemHandle> = self.items().to_vec();

        if !animated {
            for item in &items {
                let target = item.borrow().target;
                item.borrow_mut().position = target;
                sync_item_to_scene(scene, item);
            }
            return None;
        }

        let starts: Vec<Point> = items.iter().map(|i| i.borrow().position).collect();
        let targets: Vec<Point> = items.iter().map(|i| i.borrow().target).collect();
        let scene = scene.clone();
        let tween = Tween::new(POSITION_DURATION)
            .with_easing(Easing::CubicInOut)
            .with_context(context)
            .on_update(move |progress| {
                for ((item, start), target) in items.iter().zip(&starts).zip(&targets) {
                    let position = Point::lerp(*start, *target, progress);
                    item.borrow_mut().position = position;
                    sync_item_to_scene(&scene, item);
                }
            });
        Some(scheduler.start(tween))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coterie_scene::geometry::Size;
    use coterie_scene::Scene;

    fn scene_with_node() -> (SceneHandle, NodeId) {
        let scene = Scene::handle(Size::new(800.0, 600.0));
        let node = {
            let mut s = scene.borrow_mut();
            let root = s.root();
            let node = s.create_group();
            s.add_child(root, node, None);
            node
        };
        (scene, node)
    }

    #[test]
    fn rejects_unusable_radius() {
        let mut layout = Layout::from_kind(LayoutKind::Orbital);
        let (_scene, node) = scene_with_node();
        let err = layout.add_item(GlyphRecord::new("bad", 0.0), node);
        assert!(matches!(err, Err(LayoutError::InvalidRadius { .. })));
        let err = layout.add_item(GlyphRecord::new("nan", f64::NAN), node);
        assert!(matches!(err, Err(LayoutError::InvalidRadius { .. })));
    }

    #[test]
    fn non_animated_positioning_snaps_items() {
        let (scene, node) = scene_with_node();
        let mut layout = Layout::from_kind(LayoutKind::Orbital);
        layout
            .add_item(GlyphRecord::new("only", 25.0), node)
            .expect("valid radius");

        let mut scheduler = Scheduler::new();
        let tween = layout.position_items(false, &mut scheduler, &scene, ContextId::new());
        assert!(tween.is_none());
        assert!(scheduler.is_empty());

        let item = layout.items()[0].clone();
        assert_eq!(item.borrow().position, item.borrow().target);
    }

    #[test]
    fn animated_positioning_shares_one_tween() {
        let (scene, node) = scene_with_node();
        let other = {
            let mut s = scene.borrow_mut();
            let root = s.root();
            let n = s.create_group();
            s.add_child(root, n, None);
            n
        };
        let mut layout = Layout::from_kind(LayoutKind::Orbital);
        layout
            .add_item(GlyphRecord::new("a", 25.0), node)
            .expect("valid radius");
        layout
            .add_item(GlyphRecord::new("b", 15.0), other)
            .expect("valid radius");

        let mut scheduler = Scheduler::new();
        let tween = layout.position_items(true, &mut scheduler, &scene, ContextId::new());
        assert!(tween.is_some());
        assert_eq!(scheduler.active_count(), 1);

        // Drive to completion: items land exactly on their targets.
        scheduler.advance(POSITION_DURATION);
        for item in layout.items() {
            let item = item.borrow();
            assert!((item.position.x - item.target.x).abs() < 1e-9);
            assert!((item.position.y - item.target.y).abs() < 1e-9);
        }
        assert!(scheduler.is_empty());
    }

    #[test]
    fn take_records_preserves_insertion_order() {
        let (_scene, node) = scene_with_node();
        let mut layout = Layout::from_kind(LayoutKind::GraphForce);
        layout
            .add_item(GlyphRecord::new("a", 10.0), node)
            .expect("valid radius");
        layout
            .add_item(GlyphRecord::new("b", 20.0), node)
            .expect("valid radius");

        let records = layout.take_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0.id, "a");
        assert_eq!(records[1].0.id, "b");
        assert!(layout.items().is_empty());
    }
}
