// SPDX-License-Identifier: MIT OR Apache-2.0
//! The drill-down layout stack.
//!
//! A [`LayoutStack`] composes layouts into a navigable hierarchy. Pushing
//! a layout drills down: the outgoing layout fades, scales back and its
//! items move aside, while the incoming layout scales up from the source
//! glyph's position inside a translucent "aura" boundary; satellite
//! sub-layouts then swing into place around the aura. Popping reverses
//! the transition from recorded snapshots. At most one animated
//! transition is in flight per stack; starting a new one cancels the
//! previous transition's tweens before any shared position is written.

use crate::item::ItemHandle;
use crate::layout::{Layout, LayoutKind};
use coterie_motion::easing::lerp;
use coterie_motion::{ContextId, Easing, Scheduler, Tween};
use coterie_scene::backend::{Canvas, Color};
use coterie_scene::geometry::{MatrixStack, Point};
use coterie_scene::node::{Drawable, NodeId};
use coterie_scene::SceneHandle;
use std::cell::Cell;
use std::f64::consts::{FRAC_PI_2, SQRT_2, TAU};
use std::rc::Rc;

/// Duration of a push/pop choreography, in seconds
pub const TRANSITION_DURATION: f64 = 0.8;

/// Duration of the satellite swing-in after a push completes
const SATELLITE_DURATION: f64 = 0.4;

/// Scale the outgoing layout shrinks to while a child layout is open
const OUTGOING_SCALE: f64 = 0.85;

/// Alpha the outgoing layout dims to while a child layout is open
const OUTGOING_ALPHA: f64 = 0.45;

/// Scale an incoming layout grows from
const INCOMING_START_SCALE: f64 = 0.05;

/// Gap between the aura rim and repelled outgoing items
const REPEL_MARGIN: f64 = 16.0;

/// Gap between the aura rim and satellite sub-layouts
const SATELLITE_MARGIN: f64 = 24.0;

/// Fraction of the viewport's short side the aura targets when
/// auto-zooming
const AUTO_ZOOM_FILL: f64 = 0.9;

/// One breadcrumb entry per pushed layout.
///
/// Consumers rely on stable ordering and the label; the metadata blob is
/// opaque and passed through untouched.
#[derive(Debug, Clone)]
pub struct Breadcrumb {
    /// Display label for the entry
    pub label: String,
    /// Opaque consumer metadata supplied at push time
    pub metadata: Option<serde_json::Value>,
    /// Ancestors are visible; the current (innermost) entry is not
    pub visible: bool,
}

/// The translucent boundary circle marking a pushed layout's extent.
struct AuraGlyph {
    radius: Rc<Cell<f64>>,
    color: Color,
}

impl Drawable for AuraGlyph {
    fn draw(&mut self, canvas: &mut dyn Canvas, _stack: &mut MatrixStack) {
        let radius = self.radius.get();
        if radius <= 0.0 {
            return;
        }
        canvas.begin_path();
        canvas.arc(Point::zero(), radius, 0.0, TAU);
        canvas.fill(self.color.with_alpha(0.16));
        canvas.begin_path();
        canvas.arc(Point::zero(), radius, 0.0, TAU);
        canvas.stroke(self.color.with_alpha(0.5), 1.5);
    }

    fn natural_radius(&self) -> Option<f64> {
        Some(self.radius.get())
    }
}

struct SubFrame {
    container: NodeId,
    layout: Layout,
    rest_position: Point,
}

/// Destroy a popped frame's container, attached or not.
fn discard_popped(
    scene: &SceneHandle,
    root: NodeId,
    container: NodeId,
    attached: &Rc<Cell<bool>>,
) {
    let mut scene = scene.borrow_mut();
    if !scene.contains(container) {
        return;
    }
    if attached.get() {
        scene.remove_child(root, container);
        attached.set(false);
    } else {
        scene.release(container);
    }
}

struct Frame {
    layout: Layout,
    container: NodeId,
    aura_radius: Rc<Cell<f64>>,
    aura_target: f64,
    sublayouts: Vec<SubFrame>,
    source_pos: Point,
    /// The previous layout's items with their pre-transition rest
    /// positions and their repelled positions, recorded to reverse the
    /// transition on pop.
    prev_snapshot: Vec<(ItemHandle, Point, Point)>,
    /// Stack-root scale before this push, restored on pop
    prev_root_scale: f64,
    root_scale_target: f64,
    /// False once the push completed and this frame's container was
    /// detached from the draw tree (the stack then holds the only
    /// reference).
    attached: Rc<Cell<bool>>,
}

/// A navigable stack of layouts with animated drill-down/drill-up.
pub struct LayoutStack {
    scene: SceneHandle,
    root: NodeId,
    frames: Vec<Frame>,
    crumbs: Vec<Breadcrumb>,
    transition: ContextId,
    aura_color: Color,
}

impl LayoutStack {
    /// Create a stack rooted under the scene root
    pub fn new(scene: SceneHandle) -> Self {
        let root = {
            let mut s = scene.borrow_mut();
            let scene_root = s.root();
            let root = s.create_group();
            s.add_child(scene_root, root, None);
            s.release(root);
            root
        };
        Self {
            scene,
            root,
            frames: Vec::new(),
            crumbs: Vec::new(),
            transition: ContextId::new(),
            aura_color: Color::rgba(0.45, 0.55, 0.85, 1.0),
        }
    }

    /// The stack's container node in the scene
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of pushed frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Breadcrumb entries, outermost first
    pub fn breadcrumbs(&self) -> &[Breadcrumb] {
        &self.crumbs
    }

    /// The innermost layout
    pub fn top_layout(&self) -> Option<&Layout> {
        self.frames.last().map(|f| &f.layout)
    }

    /// The innermost layout, mutably
    pub fn top_layout_mut(&mut self) -> Option<&mut Layout> {
        self.frames.last_mut().map(|f| &mut f.layout)
    }

    /// Current radius of the innermost frame's aura
    pub fn top_aura_radius(&self) -> Option<f64> {
        self.frames.last().map(|f| f.aura_radius.get())
    }

    /// Whether a push/pop choreography is still in flight
    pub fn is_transitioning(&self, scheduler: &Scheduler) -> bool {
        scheduler.context_count(self.transition) > 0
    }

    /// Set the aura tint used for subsequently pushed frames
    pub fn set_aura_color(&mut self, color: Color) {
        self.aura_color = color;
    }

    /// Position of a glyph in the innermost layout, in stack-root space
    fn find_item_position(&self, id: &str) -> Option<Point> {
        let frame = self.frames.last()?;
        frame
            .layout
            .items()
            .iter()
            .find(|i| i.borrow().record.id == id)
            .map(|i| i.borrow().position)
    }

    fn auto_zoom_scale(&self, aura_target: f64, current: f64) -> f64 {
        let scene = self.scene.borrow();
        let viewport = scene.size_px(scene.root());
        let short = viewport.width.min(viewport.height);
        if aura_target <= 0.0 || short <= 0.0 {
            return current;
        }
        (short * 0.5 * AUTO_ZOOM_FILL / aura_target).clamp(0.1, 3.0)
    }

    /// Drill down into a new layout.
    ///
    /// The incoming layout is rest-positioned, wrapped in an aura sized
    /// to its bounding diagonal and attached under the stack. The
    /// outgoing layout's item positions are snapshotted for later
    /// reversal and its items are repelled outside the new aura. With
    /// `animated`, one choreographed tween drives the whole transition;
    /// its completion detaches the outgoing layout and swings satellite
    /// sub-layouts into place around the aura. `metadata` becomes the
    /// breadcrumb blob (a `"label"` string property, when present, names
    /// the entry).
    pub fn push_layout(
        &mut self,
        mut layout: Layout,
        sub_layouts: Vec<Layout>,
        animated: bool,
        source_item: Option<&str>,
        auto_zoom: bool,
        metadata: Option<serde_json::Value>,
        scheduler: &mut Scheduler,
    ) {
        // One transition in flight per stack: cancel the previous one
        // before anything writes shared item positions.
        scheduler.stop_context(self.transition);
        self.transition = ContextId::new();
        let ctx = self.transition;
        // A cancelled transition may have left covered frames attached;
        // their detach normally happens in its completion handler.
        self.detach_covered_frames();

        layout.position_items(false, scheduler, &self.scene, ctx);
        let aura_target = layout.bounding_radius() * SQRT_2;
        let source_pos = source_item
            .and_then(|id| self.find_item_position(id))
            .unwrap_or_else(Point::zero);

        let aura_radius = Rc::new(Cell::new(if animated { 0.0 } else { aura_target }));
        let container = {
            let mut scene = self.scene.borrow_mut();
            let container = scene.create_group();
            scene.add_child(self.root, container, None);
            scene.release(container);

            let aura = scene.create_leaf(Box::new(AuraGlyph {
                radius: aura_radius.clone(),
                color: self.aura_color,
            }));
            scene.add_child(container, aura, Some(0));
            scene.release(aura);

            for item in layout.items() {
                let (node, position) = {
                    let item = item.borrow();
                    (item.node, item.position)
                };
                if scene.contains(node) {
                    scene.add_child(container, node, None);
                    scene.set_position_px(node, position);
                }
            }

            if animated {
                scene.set_position_px(container, source_pos);
                scene.set_scale(container, INCOMING_START_SCALE);
                scene.set_alpha(container, 0.0);
            }
            container
        };

        // Satellite sub-layouts rest on a circle around the aura.
        let sub_count = sub_layouts.len();
        let mut sublayouts = Vec::with_capacity(sub_count);
        for (slot, mut sub) in sub_layouts.into_iter().enumerate() {
            sub.position_items(false, scheduler, &self.scene, ctx);
            let angle = slot as f64 * TAU / sub_count.max(1) as f64 - FRAC_PI_2;
            let distance = aura_target + sub.bounding_radius() + SATELLITE_MARGIN;
            let rest_position = Point::from_polar(distance, angle);

            let sub_container = {
                let mut scene = self.scene.borrow_mut();
                let sub_container = scene.create_group();
                scene.add_child(container, sub_container, None);
                scene.release(sub_container);
                for item in sub.items() {
                    let (node, position) = {
                        let item = item.borrow();
                        (item.node, item.position)
                    };
                    if scene.contains(node) {
                        scene.add_child(sub_container, node, None);
                        scene.set_position_px(node, position);
                    }
                }
                if animated {
                    scene.set_position_px(sub_container, Point::zero());
                    scene.set_alpha(sub_container, 0.0);
                } else {
                    scene.set_position_px(sub_container, rest_position);
                }
                sub_container
            };
            sublayouts.push(SubFrame {
                container: sub_container,
                layout: sub,
                rest_position,
            });
        }

        // Snapshot and repulsion for the outgoing layout's items.
        let prev_info = self
            .frames
            .last()
            .map(|f| (f.container, f.attached.clone()));
        let mut prev_snapshot: Vec<(ItemHandle, Point, Point)> = Vec::new();
        if let Some(prev) = self.frames.last() {
            for item in prev.layout.items() {
                let (rest, radius) = {
                    let item = item.borrow();
                    (item.position, item.radius())
                };
                let away = rest - source_pos;
                let direction = away.normalized();
                // A zero-distance vector repels nowhere: the item stays
                // put rather than propagating NaN.
                let pushed = if direction == Point::zero() {
                    rest
                } else {
                    let needed = aura_target + radius + REPEL_MARGIN;
                    if away.length() >= needed {
                        rest
                    } else {
                        source_pos + direction * needed
                    }
                };
                prev_snapshot.push((item.clone(), rest, pushed));
            }
        }

        let prev_root_scale = self.scene.borrow().scale(self.root);
        let root_scale_target = if auto_zoom {
            self.auto_zoom_scale(aura_target, prev_root_scale)
        } else {
            prev_root_scale
        };

        let label = metadata
            .as_ref()
            .and_then(|m| m.get("label"))
            .and_then(|v| v.as_str())
            .map(String::from)
            .or_else(|| source_item.map(String::from))
            .unwrap_or_else(|| format!("layer {}", self.frames.len() + 1));
        if let Some(prev_crumb) = self.crumbs.last_mut() {
            prev_crumb.visible = true;
        }
        self.crumbs.push(Breadcrumb {
            label: label.clone(),
            metadata: metadata.clone(),
            visible: false,
        });
        tracing::info!(label = %label, depth = self.frames.len() + 1, animated, "push layout");

        let frame = Frame {
            layout,
            container,
            aura_radius: aura_radius.clone(),
            aura_target,
            sublayouts,
            source_pos,
            prev_snapshot,
            prev_root_scale,
            root_scale_target,
            attached: Rc::new(Cell::new(true)),
        };

        if animated {
            let root = self.root;
            let scene_update = self.scene.clone();
            let snapshot = frame.prev_snapshot.clone();
            let update_prev = prev_info.clone();
            let aura_anim = aura_radius.clone();
            let tween = Tween::new(TRANSITION_DURATION)
                .with_easing(Easing::CubicInOut)
                .with_context(ctx)
                .on_update(move |progress| {
                    let mut scene = scene_update.borrow_mut();
                    if scene.contains(container) {
                        scene.set_position_px(
                            container,
                            Point::lerp(source_pos, Point::zero(), progress),
                        );
                        scene.set_scale(container, lerp(INCOMING_START_SCALE, 1.0, progress));
                        scene.set_alpha(container, progress);
                    }
                    if let Some((prev_container, _)) = &update_prev {
                        if scene.contains(*prev_container) {
                            scene.set_scale(*prev_container, lerp(1.0, OUTGOING_SCALE, progress));
                            scene.set_alpha(*prev_container, lerp(1.0, OUTGOING_ALPHA, progress));
                        }
                    }
                    for (item, rest, pushed) in &snapshot {
                        let position = Point::lerp(*rest, *pushed, progress);
                        let node = {
                            let mut item = item.borrow_mut();
                            item.position = position;
                            item.node
                        };
                        if scene.contains(node) {
                            scene.set_position_px(node, position);
                        }
                    }
                    aura_anim.set(lerp(0.0, aura_target, progress));
                    if auto_zoom && scene.contains(root) {
                        scene.set_scale(root, lerp(prev_root_scale, root_scale_target, progress));
                    }
                });

            let scene_end = self.scene.clone();
            let satellites: Vec<(NodeId, Point)> = frame
                .sublayouts
                .iter()
                .map(|s| (s.container, s.rest_position))
                .collect();
            let tween = tween.on_end(move |scheduler| {
                // Detach the outgoing layout; the frame keeps the only
                // reference so a later pop can reattach it.
                if let Some((prev_container, attached)) = prev_info {
                    let mut scene = scene_end.borrow_mut();
                    if attached.get() && scene.contains(prev_container) {
                        scene.retain(prev_container);
                        scene.remove_child(root, prev_container);
                        attached.set(false);
                    }
                }
                for (sub_container, rest_position) in satellites {
                    let scene = scene_end.clone();
                    scheduler.start(
                        Tween::new(SATELLITE_DURATION)
                            .with_easing(Easing::BackOut)
                            .with_context(ctx)
                            .on_update(move |progress| {
                                let mut scene = scene.borrow_mut();
                                if scene.contains(sub_container) {
                                    scene.set_alpha(sub_container, progress.clamp(0.0, 1.0));
                                    scene.set_position_px(
                                        sub_container,
                                        Point::lerp(Point::zero(), rest_position, progress),
                                    );
                                }
                            }),
                    );
                }
            });
            scheduler.start(tween);
        } else {
            let mut scene = self.scene.borrow_mut();
            if let Some((prev_container, attached)) = prev_info {
                if attached.get() && scene.contains(prev_container) {
                    scene.retain(prev_container);
                    scene.remove_child(self.root, prev_container);
                    attached.set(false);
                }
            }
            for (item, _, pushed) in &frame.prev_snapshot {
                let node = {
                    let mut item = item.borrow_mut();
                    item.position = *pushed;
                    item.node
                };
                if scene.contains(node) {
                    scene.set_position_px(node, *pushed);
                }
            }
            for sub in &frame.sublayouts {
                if scene.contains(sub.container) {
                    scene.set_alpha(sub.container, 1.0);
                }
            }
            if auto_zoom && scene.contains(self.root) {
                scene.set_scale(self.root, root_scale_target);
            }
        }

        self.frames.push(frame);
    }

    /// Drill back up `count` frames.
    ///
    /// The topmost frame reverses its recorded transition (items return
    /// to their snapshot positions, or to a freshly computed rest layout
    /// for items added after the push); deeper frames are discarded
    /// instantly. Breadcrumbs pop alongside and the new innermost entry
    /// becomes hidden again.
    pub fn pop_layout(
        &mut self,
        count: usize,
        animated: bool,
        auto_zoom: bool,
        scheduler: &mut Scheduler,
    ) {
        let count = count.min(self.frames.len());
        if count == 0 {
            return;
        }
        scheduler.stop_context(self.transition);
        self.transition = ContextId::new();
        let ctx = self.transition;
        let root = self.root;
        let scene_handle = self.scene.clone();

        // The visible top frame carries the choreography. Frames between
        // it and the landing point were detached when they were covered;
        // they vanish without choreography, but the deepest of them holds
        // the landing layout's pre-push snapshot (and the root scale to
        // restore), which supersede the top frame's.
        let mut removed = self.frames.pop().expect("count clamped to depth");
        self.crumbs.pop();
        for _ in 0..count - 1 {
            let deeper = self.frames.pop().expect("count clamped to depth");
            self.crumbs.pop();
            removed.prev_snapshot = deeper.prev_snapshot.clone();
            removed.prev_root_scale = deeper.prev_root_scale;
            self.discard_frame(&deeper);
        }
        if let Some(crumb) = self.crumbs.last_mut() {
            crumb.visible = false;
        }
        tracing::info!(depth = self.frames.len(), animated, "pop layout");

        // Reattach the landing frame and build its restore list: snapshot
        // positions where recorded, freshly computed rest positions for
        // items the snapshot never saw.
        let mut restore: Vec<(ItemHandle, Point, Point)> = Vec::new();
        let mut landing = None;
        if let Some(prev) = self.frames.last_mut() {
            {
                let mut scene = scene_handle.borrow_mut();
                if !prev.attached.get() && scene.contains(prev.container) {
                    scene.add_child(root, prev.container, None);
                    scene.release(prev.container);
                    prev.attached.set(true);
                }
            }
            let needs_rest_solve = prev.layout.items().iter().any(|item| {
                !removed
                    .prev_snapshot
                    .iter()
                    .any(|(snap, _, _)| Rc::ptr_eq(snap, item))
            });
            if needs_rest_solve {
                prev.layout.compute_targets();
            }
            for item in prev.layout.items() {
                let snapshot_rest = removed
                    .prev_snapshot
                    .iter()
                    .find(|(snap, _, _)| Rc::ptr_eq(snap, item))
                    .map(|(_, rest, _)| *rest);
                let current = item.borrow().position;
                let rest = snapshot_rest.unwrap_or_else(|| item.borrow().target);
                restore.push((item.clone(), current, rest));
            }
            landing = Some(prev.container);
        }
        let aura_radius = removed.aura_radius.clone();
        let aura_target = removed.aura_target;
        let source_pos = removed.source_pos;
        let removed_container = removed.container;
        let removed_attached = removed.attached.clone();
        let root_scale_now = self.scene.borrow().scale(root);
        let root_scale_target = if auto_zoom {
            removed.prev_root_scale
        } else {
            root_scale_now
        };

        if animated {
            let scene_update = self.scene.clone();
            let restore_anim = restore;
            let tween = Tween::new(TRANSITION_DURATION)
                .with_easing(Easing::CubicInOut)
                .with_context(ctx)
                .on_update(move |progress| {
                    let mut scene = scene_update.borrow_mut();
                    if scene.contains(removed_container) {
                        scene.set_position_px(
                            removed_container,
                            Point::lerp(Point::zero(), source_pos, progress),
                        );
                        scene.set_scale(
                            removed_container,
                            lerp(1.0, INCOMING_START_SCALE, progress),
                        );
                        scene.set_alpha(removed_container, 1.0 - progress);
                    }
                    if let Some(landing_container) = landing {
                        if scene.contains(landing_container) {
                            scene.set_scale(
                                landing_container,
                                lerp(OUTGOING_SCALE, 1.0, progress),
                            );
                            scene.set_alpha(
                                landing_container,
                                lerp(OUTGOING_ALPHA, 1.0, progress),
                            );
                        }
                    }
                    for (item, current, rest) in &restore_anim {
                        let position = Point::lerp(*current, *rest, progress);
                        let node = {
                            let mut item = item.borrow_mut();
                            item.position = position;
                            item.node
                        };
                        if scene.contains(node) {
                            scene.set_position_px(node, position);
                        }
                    }
                    aura_radius.set(lerp(aura_target, 0.0, progress));
                    if auto_zoom && scene.contains(root) {
                        scene.set_scale(root, lerp(root_scale_now, root_scale_target, progress));
                    }
                });

            // The removed frame left the stack when the pop began, so its
            // nodes must go away whether the choreography completes or a
            // newer transition cancels it.
            let scene_end = self.scene.clone();
            let end_attached = removed_attached.clone();
            let tween = tween.on_end(move |_| {
                discard_popped(&scene_end, root, removed_container, &end_attached);
            });
            let scene_stop = self.scene.clone();
            let stop_attached = removed_attached.clone();
            let tween = tween.on_stop(move |_| {
                discard_popped(&scene_stop, root, removed_container, &stop_attached);
            });
            scheduler.start(tween);
        } else {
            {
                let mut scene = self.scene.borrow_mut();
                for (item, _, rest) in &restore {
                    let node = {
                        let mut item = item.borrow_mut();
                        item.position = *rest;
                        item.node
                    };
                    if scene.contains(node) {
                        scene.set_position_px(node, *rest);
                    }
                }
                if let Some(landing_container) = landing {
                    if scene.contains(landing_container) {
                        scene.set_scale(landing_container, 1.0);
                        scene.set_alpha(landing_container, 1.0);
                    }
                }
                if auto_zoom && scene.contains(root) {
                    scene.set_scale(root, root_scale_target);
                }
            }
            self.discard_frame(&removed);
        }
    }

    /// Detach every frame except the innermost from the draw tree. The
    /// frame keeps the only reference so a later pop can reattach it.
    fn detach_covered_frames(&self) {
        let Some((_, covered)) = self.frames.split_last() else {
            return;
        };
        let mut scene = self.scene.borrow_mut();
        for frame in covered {
            if frame.attached.get() && scene.contains(frame.container) {
                scene.retain(frame.container);
                scene.remove_child(self.root, frame.container);
                frame.attached.set(false);
            }
        }
    }

    fn discard_frame(&self, frame: &Frame) {
        let mut scene = self.scene.borrow_mut();
        if !scene.contains(frame.container) {
            return;
        }
        if frame.attached.get() {
            scene.remove_child(self.root, frame.container);
        } else {
            scene.release(frame.container);
        }
    }

    /// Switch every frame to a new named layout kind.
    ///
    /// Each frame's layout is rebuilt with the new kind, its items
    /// re-added and rest-positioned. With a `Custom` layout anywhere in
    /// the stack this is only well-defined at depth 1.
    pub fn set_kind(&mut self, kind: LayoutKind, scheduler: &mut Scheduler) {
        if self.frames.len() > 1 && self.frames.iter().any(|f| f.layout.kind().is_none()) {
            tracing::warn!("kind switch over custom layouts is only well-defined at depth 1");
        }
        for frame in &mut self.frames {
            let records = frame.layout.take_records();
            let mut rebuilt = Layout::from_kind(kind);
            for (record, node) in records {
                if let Err(error) = rebuilt.add_item(record, node) {
                    tracing::warn!(%error, "dropping item while switching layout kind");
                }
            }
            rebuilt.position_items(false, scheduler, &self.scene, self.transition);
            frame.aura_target = rebuilt.bounding_radius() * SQRT_2;
            frame.aura_radius.set(frame.aura_target);
            frame.layout = rebuilt;
        }
        tracing::info!(?kind, depth = self.frames.len(), "layout kind switched");
    }

    /// Advance the innermost layout's continuous simulation and write the
    /// resulting positions through to the scene.
    pub fn step(&mut self, dt: f64) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        frame.layout.step(dt);
        frame.layout.sync_to_scene(&self.scene);
        for sub in &mut frame.sublayouts {
            sub.layout.step(dt);
            sub.layout.sync_to_scene(&self.scene);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::GlyphRecord;
    use coterie_scene::geometry::Size;
    use coterie_scene::Scene;

    fn setup() -> (SceneHandle, LayoutStack, Scheduler) {
        let scene = Scene::handle(Size::new(800.0, 600.0));
        let stack = LayoutStack::new(scene.clone());
        (scene, stack, Scheduler::new())
    }

    fn glyph_layout(scene: &SceneHandle, glyphs: &[(&str, f64)]) -> Layout {
        let mut layout = Layout::from_kind(LayoutKind::Orbital);
        let mut s = scene.borrow_mut();
        for (id, radius) in glyphs {
            let node = s.create_group();
            layout
                .add_item(GlyphRecord::new(*id, *radius), node)
                .expect("valid radius");
        }
        layout
    }

    fn item_positions(layout: &Layout) -> Vec<(String, Point)> {
        layout
            .items()
            .iter()
            .map(|i| {
                let i = i.borrow();
                (i.record.id.clone(), i.position)
            })
            .collect()
    }

    #[test]
    fn push_then_pop_round_trips_item_positions() {
        let (scene, mut stack, mut scheduler) = setup();

        let inner = glyph_layout(&scene, &[("a", 40.0), ("b", 25.0), ("c", 15.0)]);
        stack.push_layout(inner, Vec::new(), false, None, false, None, &mut scheduler);
        let before = item_positions(stack.top_layout().expect("frame pushed"));

        let child = glyph_layout(&scene, &[("d", 30.0), ("e", 20.0)]);
        stack.push_layout(child, Vec::new(), true, Some("a"), false, None, &mut scheduler);
        scheduler.advance(TRANSITION_DURATION);
        assert!(!stack.is_transitioning(&scheduler));
        assert_eq!(stack.depth(), 2);

        stack.pop_layout(1, true, false, &mut scheduler);
        scheduler.advance(TRANSITION_DURATION);
        assert_eq!(stack.depth(), 1);

        let after = item_positions(stack.top_layout().expect("frame remains"));
        for ((id_before, p_before), (id_after, p_after)) in before.iter().zip(&after) {
            assert_eq!(id_before, id_after);
            assert!(
                (p_before.x - p_after.x).abs() < 1e-6
                    && (p_before.y - p_after.y).abs() < 1e-6,
                "{id_before} moved: {p_before:?} -> {p_after:?}"
            );
        }
    }

    #[test]
    fn repelled_items_leave_the_aura() {
        let (scene, mut stack, mut scheduler) = setup();

        let inner = glyph_layout(&scene, &[("a", 40.0), ("b", 25.0)]);
        stack.push_layout(inner, Vec::new(), false, None, false, None, &mut scheduler);

        let child = glyph_layout(&scene, &[("d", 30.0)]);
        stack.push_layout(child, Vec::new(), true, Some("a"), false, None, &mut scheduler);
        scheduler.advance(TRANSITION_DURATION);

        let aura = stack.top_aura_radius().expect("aura exists");
        assert!(aura > 0.0);

        // "a" sat exactly at the drill-down source: the zero-distance
        // guard leaves it in place. "b" must have been pushed outside
        // the aura rim.
        let frame_below = &stack.frames[0];
        let b = frame_below.layout.items()[1].borrow();
        assert!(b.position.length() >= aura + b.radius());
    }

    #[test]
    fn new_transition_cancels_the_one_in_flight() {
        let (scene, mut stack, mut scheduler) = setup();

        let base = glyph_layout(&scene, &[("a", 40.0)]);
        stack.push_layout(base, Vec::new(), false, None, false, None, &mut scheduler);

        let first = glyph_layout(&scene, &[("b", 30.0)]);
        stack.push_layout(first, Vec::new(), true, None, false, None, &mut scheduler);
        assert_eq!(scheduler.active_count(), 1);
        scheduler.advance(TRANSITION_DURATION * 0.25);

        let second = glyph_layout(&scene, &[("c", 20.0)]);
        stack.push_layout(second, Vec::new(), true, None, false, None, &mut scheduler);
        // The old choreography is gone; exactly the new one is active.
        assert_eq!(scheduler.active_count(), 1);
        assert!(stack.is_transitioning(&scheduler));
        assert_eq!(stack.depth(), 3);
    }

    #[test]
    fn completed_push_detaches_the_outgoing_layout() {
        let (scene, mut stack, mut scheduler) = setup();

        let base = glyph_layout(&scene, &[("a", 40.0)]);
        stack.push_layout(base, Vec::new(), false, None, false, None, &mut scheduler);
        assert_eq!(scene.borrow().children(stack.root()).len(), 1);

        let child = glyph_layout(&scene, &[("b", 30.0)]);
        stack.push_layout(child, Vec::new(), true, None, false, None, &mut scheduler);
        assert_eq!(scene.borrow().children(stack.root()).len(), 2);

        scheduler.advance(TRANSITION_DURATION);
        assert_eq!(scene.borrow().children(stack.root()).len(), 1);

        // Popping reattaches the base frame and destroys the child's.
        stack.pop_layout(1, false, false, &mut scheduler);
        assert_eq!(scene.borrow().children(stack.root()).len(), 1);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn breadcrumbs_keep_order_labels_and_visibility() {
        let (scene, mut stack, mut scheduler) = setup();

        let base = glyph_layout(&scene, &[("a", 40.0)]);
        stack.push_layout(
            base,
            Vec::new(),
            false,
            None,
            false,
            Some(serde_json::json!({"label": "Everyone", "cohort": 7})),
            &mut scheduler,
        );
        let child = glyph_layout(&scene, &[("b", 30.0)]);
        stack.push_layout(child, Vec::new(), false, Some("a"), false, None, &mut scheduler);

        let crumbs = stack.breadcrumbs();
        assert_eq!(crumbs.len(), 2);
        assert_eq!(crumbs[0].label, "Everyone");
        assert_eq!(crumbs[0].metadata.as_ref().expect("metadata kept")["cohort"], 7);
        assert!(crumbs[0].visible);
        assert_eq!(crumbs[1].label, "a");
        assert!(!crumbs[1].visible);

        stack.pop_layout(1, false, false, &mut scheduler);
        let crumbs = stack.breadcrumbs();
        assert_eq!(crumbs.len(), 1);
        assert!(!crumbs[0].visible);
    }

    #[test]
    fn aura_is_sized_to_the_layout_diagonal() {
        let (scene, mut stack, mut scheduler) = setup();
        let base = glyph_layout(&scene, &[("a", 40.0), ("b", 25.0)]);
        stack.push_layout(base, Vec::new(), false, None, false, None, &mut scheduler);

        let bounding = stack.top_layout().expect("frame").bounding_radius();
        let aura = stack.top_aura_radius().expect("aura");
        assert!((aura - bounding * SQRT_2).abs() < 1e-9);
    }

    #[test]
    fn popping_multiple_frames_lands_on_the_right_snapshot() {
        let (scene, mut stack, mut scheduler) = setup();

        let base = glyph_layout(&scene, &[("a", 40.0), ("b", 25.0)]);
        stack.push_layout(base, Vec::new(), false, None, false, None, &mut scheduler);
        let before = item_positions(stack.top_layout().expect("frame"));

        let mid = glyph_layout(&scene, &[("c", 30.0)]);
        stack.push_layout(mid, Vec::new(), false, None, false, None, &mut scheduler);
        let deep = glyph_layout(&scene, &[("d", 20.0)]);
        stack.push_layout(deep, Vec::new(), false, None, false, None, &mut scheduler);

        stack.pop_layout(2, false, false, &mut scheduler);
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.breadcrumbs().len(), 1);

        let after = item_positions(stack.top_layout().expect("frame"));
        for ((_, p_before), (_, p_after)) in before.iter().zip(&after) {
            assert!((p_before.x - p_after.x).abs() < 1e-6);
            assert!((p_before.y - p_after.y).abs() < 1e-6);
        }
    }

    #[test]
    fn items_added_after_push_fall_back_to_a_rest_solve() {
        let (scene, mut stack, mut scheduler) = setup();

        let base = glyph_layout(&scene, &[("a", 40.0)]);
        stack.push_layout(base, Vec::new(), false, None, false, None, &mut scheduler);

        let child = glyph_layout(&scene, &[("b", 30.0)]);
        stack.push_layout(child, Vec::new(), false, None, false, None, &mut scheduler);

        // A glyph the pre-push snapshot never saw.
        let node = scene.borrow_mut().create_group();
        stack.frames[0]
            .layout
            .add_item(GlyphRecord::new("late", 10.0), node)
            .expect("valid radius");

        stack.pop_layout(1, false, false, &mut scheduler);
        let layout = stack.top_layout().expect("frame");
        let late = layout.items()[1].borrow();
        assert!(late.position.is_finite());
        assert_eq!(late.position, late.target);
    }

    #[test]
    fn set_kind_rebuilds_every_frame_with_items_intact() {
        let (scene, mut stack, mut scheduler) = setup();

        let base = glyph_layout(&scene, &[("a", 40.0), ("b", 25.0), ("c", 15.0)]);
        stack.push_layout(base, Vec::new(), false, None, false, None, &mut scheduler);
        assert_eq!(stack.top_layout().expect("frame").kind(), Some(LayoutKind::Orbital));

        stack.set_kind(LayoutKind::GraphForce, &mut scheduler);
        let layout = stack.top_layout().expect("frame");
        assert_eq!(layout.kind(), Some(LayoutKind::GraphForce));
        assert_eq!(layout.items().len(), 3);
        for item in layout.items() {
            assert!(item.borrow().position.is_finite());
        }
    }

    #[test]
    fn physical_frames_step_and_sync_through_the_stack() {
        let (scene, mut stack, mut scheduler) = setup();

        let mut layout = Layout::from_kind(LayoutKind::Physical);
        let (king_node, other_node) = {
            let mut s = scene.borrow_mut();
            (s.create_group(), s.create_group())
        };
        layout
            .add_item(GlyphRecord::new("king", 40.0), king_node)
            .expect("valid radius");
        layout
            .add_item(GlyphRecord::new("moon", 15.0), other_node)
            .expect("valid radius");
        stack.push_layout(layout, Vec::new(), false, None, false, None, &mut scheduler);

        for _ in 0..30 {
            stack.step(1.0 / 60.0);
        }
        // The pinned king stays at the layout center and its node follows.
        assert_eq!(scene.borrow().position_px(king_node), Point::zero());
        let moon = stack.top_layout().expect("frame").items()[1].borrow().position;
        assert_eq!(scene.borrow().position_px(other_node), moon);
    }

    #[test]
    fn satellites_swing_in_after_the_push_completes() {
        let (scene, mut stack, mut scheduler) = setup();

        let base = glyph_layout(&scene, &[("a", 40.0)]);
        stack.push_layout(base, Vec::new(), false, None, false, None, &mut scheduler);

        let child = glyph_layout(&scene, &[("b", 30.0)]);
        let satellite = glyph_layout(&scene, &[("s1", 12.0)]);
        stack.push_layout(
            child,
            vec![satellite],
            true,
            None,
            false,
            None,
            &mut scheduler,
        );

        scheduler.advance(TRANSITION_DURATION);
        // The satellite swing-in is registered by the completion handler.
        assert_eq!(scheduler.active_count(), 1);
        scheduler.advance(SATELLITE_DURATION);
        assert!(scheduler.is_empty());

        let frame = stack.frames.last().expect("frame");
        let sub = &frame.sublayouts[0];
        let position = scene.borrow().position_px(sub.container);
        assert!((position.x - sub.rest_position.x).abs() < 1e-6);
        assert!((position.y - sub.rest_position.y).abs() < 1e-6);
        assert!(scene.borrow().alpha(sub.container) >= 1.0 - 1e-9);
    }

    #[test]
    fn auto_zoom_scales_the_stack_root_and_pop_restores_it() {
        let (scene, mut stack, mut scheduler) = setup();

        let base = glyph_layout(&scene, &[("a", 40.0)]);
        stack.push_layout(base, Vec::new(), false, None, false, None, &mut scheduler);
        let initial = scene.borrow().scale(stack.root());

        let child = glyph_layout(&scene, &[("b", 300.0)]);
        stack.push_layout(child, Vec::new(), false, None, true, None, &mut scheduler);
        let zoomed = scene.borrow().scale(stack.root());
        assert!(zoomed < initial, "a large layout zooms the stack out");

        stack.pop_layout(1, false, true, &mut scheduler);
        let restored = scene.borrow().scale(stack.root());
        assert!((restored - initial).abs() < 1e-9);
    }
}
