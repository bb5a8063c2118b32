// SPDX-License-Identifier: MIT OR Apache-2.0
//! Force-directed placement over a weighted link graph.
//!
//! Items are nodes of a link graph; links reference other items by id.
//! Placement runs an iterative solver balancing link attraction, pairwise
//! repulsion and collision separation, with a linearly cooling step cap,
//! until displacement converges or the iteration budget runs out. Links
//! whose endpoint is not in the layout are dropped, never an error.

use crate::item::{GlyphRecord, ItemHandle};
use crate::layout::{make_item, LayoutAlgorithm, LayoutError};
use coterie_scene::geometry::{Point, GEOM_EPSILON};
use coterie_scene::node::NodeId;
use std::collections::HashMap;

/// Iteration budget for one solve
pub const ITERATION_BUDGET: usize = 400;

/// Peak per-iteration displacement below which the solve counts as
/// converged, in pixels
const CONVERGENCE_EPS: f64 = 0.25;

/// Largest displacement one iteration may apply at full temperature
const MAX_STEP: f64 = 24.0;

/// Deterministic seeding angle increment for unplaced items
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

struct ResolvedLink {
    a: usize,
    b: usize,
    strength: f64,
}

/// The force-directed layout.
pub struct GraphForceLayout {
    items: Vec<ItemHandle>,
    center: Point,
    link_distance: f64,
    spring: f64,
    repulsion: f64,
    collision_padding: f64,
}

impl GraphForceLayout {
    /// Create a layout with default tuning
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            center: Point::zero(),
            link_distance: 90.0,
            spring: 0.06,
            repulsion: 60_000.0,
            collision_padding: 4.0,
        }
    }

    /// Set the rest length links relax toward
    pub fn with_link_distance(mut self, distance: f64) -> Self {
        self.link_distance = distance.max(0.0);
        self
    }

    /// Set the spring stiffness for link attraction
    pub fn with_spring(mut self, spring: f64) -> Self {
        self.spring = spring.max(0.0);
        self
    }

    /// Set the pairwise repulsion constant
    pub fn with_repulsion(mut self, repulsion: f64) -> Self {
        self.repulsion = repulsion.max(0.0);
        self
    }

    /// Resolve link endpoints to item indices, dropping the unresolved.
    fn resolve_links(&self) -> Vec<ResolvedLink> {
        let index: HashMap<String, usize> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.borrow().record.id.clone(), i))
            .collect();

        let mut links = Vec::new();
        for (a, item) in self.items.iter().enumerate() {
            for link in &item.borrow().record.links {
                match index.get(link.target.as_str()) {
                    Some(&b) if b != a => links.push(ResolvedLink {
                        a,
                        b,
                        strength: link.strength.max(0.0),
                    }),
                    Some(_) => {}
                    None => {
                        tracing::debug!(link = %link.target, "dropping unresolved link");
                    }
                }
            }
        }
        links
    }

    /// Spread items that share a position so repulsion has a direction to
    /// work with. Seeding is deterministic: golden-angle spiral by index.
    fn seed_positions(&self, positions: &mut [Point]) {
        for i in 0..positions.len() {
            let coincident = positions
                .iter()
                .take(i)
                .any(|p| p.distance(positions[i]) < GEOM_EPSILON);
            if coincident {
                let angle = i as f64 * GOLDEN_ANGLE;
                let radius = self.link_distance * 0.5 * (1.0 + i as f64 * 0.2);
                positions[i] = self.center + Point::from_polar(radius, angle);
            }
        }
    }
}

impl Default for GraphForceLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutAlgorithm for GraphForceLayout {
    fn add_item(&mut self, record: GlyphRecord, node: NodeId) -> Result<ItemHandle, LayoutError> {
        let item = make_item(&self.items, record, node)?;
        self.items.push(item.clone());
        Ok(item)
    }

    fn remove_item(&mut self, id: &str) -> Option<ItemHandle> {
        let index = self.items.iter().position(|i| i.borrow().record.id == id)?;
        Some(self.items.remove(index))
    }

    fn remove_all_items(&mut self) {
        self.items.clear();
    }

    fn items(&self) -> &[ItemHandle] {
        &self.items
    }

    fn compute_targets(&mut self) {
        let n = self.items.len();
        if n == 0 {
            return;
        }
        if n == 1 {
            self.items[0].borrow_mut().target = self.center;
            return;
        }

        let links = self.resolve_links();
        let radii: Vec<f64> = self.items.iter().map(|i| i.borrow().radius()).collect();
        let mut positions: Vec<Point> = self.items.iter().map(|i| i.borrow().position).collect();
        self.seed_positions(&mut positions);

        let mut iterations = 0;
        for iteration in 0..ITERATION_BUDGET {
            iterations = iteration + 1;
            let cooling = 1.0 - iteration as f64 / ITERATION_BUDGET as f64;
            let step_cap = MAX_STEP * cooling + CONVERGENCE_EPS;
            let mut displacement = vec![Point::zero(); n];

            // Pairwise repulsion, inverse-square with a distance floor.
            for i in 0..n {
                for j in (i + 1)..n {
                    let delta = positions[i] - positions[j];
                    let distance_sq = delta.length_squared().max(1.0);
                    let push = delta.normalized() * (self.repulsion / distance_sq);
                    displacement[i] += push;
                    displacement[j] += -push;
                }
            }

            // Link springs toward their rest length.
            for link in &links {
                let delta = positions[link.b] - positions[link.a];
                let distance = delta.length();
                if distance < GEOM_EPSILON {
                    continue;
                }
                let rest = self.link_distance + radii[link.a] + radii[link.b];
                let force = self.spring * link.strength * (distance - rest);
                let pull = delta * (force / distance);
                displacement[link.a] += pull;
                displacement[link.b] += -pull;
            }

            // Collision separation: overlapping pairs push straight apart.
            for i in 0..n {
                for j in (i + 1)..n {
                    let delta = positions[i] - positions[j];
                    let distance = delta.length();
                    let min_distance = radii[i] + radii[j] + self.collision_padding;
                    if distance >= min_distance {
                        continue;
                    }
                    let normal = if distance > GEOM_EPSILON {
                        delta * (1.0 / distance)
                    } else {
                        Point::new(1.0, 0.0)
                    };
                    let push = normal * ((min_distance - distance) * 0.5);
                    displacement[i] += push;
                    displacement[j] += -push;
                }
            }

            // Gentle centering so disconnected components do not drift.
            for i in 0..n {
                displacement[i] += (self.center - positions[i]) * 0.01;
            }

            // Apply with the cooled step cap; track peak movement.
            let mut peak = 0.0_f64;
            for i in 0..n {
                let length = displacement[i].length();
                let applied = if length > step_cap {
                    displacement[i] * (step_cap / length)
                } else {
                    displacement[i]
                };
                positions[i] += applied;
                peak = peak.max(applied.length());
            }
            if peak < CONVERGENCE_EPS {
                break;
            }
        }
        tracing::debug!(iterations, items = n, "graph-force solve finished");

        for (item, position) in self.items.iter().zip(&positions) {
            item.borrow_mut().target = *position;
        }
    }

    fn bounding_radius(&self) -> f64 {
        self.items
            .iter()
            .map(|i| {
                let item = i.borrow();
                item.target.distance(self.center) + item.radius()
            })
            .fold(0.0, f64::max)
    }

    fn center(&self) -> Point {
        self.center
    }

    fn set_center(&mut self, center: Point) {
        let shift = center - self.center;
        self.center = center;
        for item in &self.items {
            let mut item = item.borrow_mut();
            item.position += shift;
            item.target += shift;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coterie_scene::geometry::Size;
    use coterie_scene::Scene;

    fn node() -> NodeId {
        let mut scene = Scene::new(Size::new(800.0, 600.0));
        scene.create_group()
    }

    fn solved(records: Vec<GlyphRecord>) -> GraphForceLayout {
        let mut layout = GraphForceLayout::new();
        for record in records {
            layout.add_item(record, node()).expect("valid radius");
        }
        layout.compute_targets();
        layout
    }

    #[test]
    fn linked_pairs_sit_closer_than_unlinked() {
        let layout = solved(vec![
            GlyphRecord::new("a", 20.0).with_link("b", 1.0),
            GlyphRecord::new("b", 20.0),
            GlyphRecord::new("c", 20.0),
        ]);
        let a = layout.items()[0].borrow().target;
        let b = layout.items()[1].borrow().target;
        let c = layout.items()[2].borrow().target;

        let linked = a.distance(b);
        let unlinked = a.distance(c).min(b.distance(c));
        assert!(
            linked < unlinked,
            "linked pair ({linked}) should be closer than unlinked ({unlinked})"
        );
    }

    #[test]
    fn unresolved_links_are_dropped_not_fatal() {
        let layout = solved(vec![
            GlyphRecord::new("a", 20.0).with_link("ghost", 2.0),
            GlyphRecord::new("b", 20.0),
        ]);
        for item in layout.items() {
            assert!(item.borrow().target.is_finite());
        }
    }

    #[test]
    fn self_links_are_ignored() {
        let layout = solved(vec![
            GlyphRecord::new("a", 20.0).with_link("a", 5.0),
            GlyphRecord::new("b", 20.0),
        ]);
        assert!(layout.items()[0].borrow().target.is_finite());
    }

    #[test]
    fn solved_items_do_not_overlap() {
        let layout = solved(vec![
            GlyphRecord::new("a", 25.0).with_link("b", 1.0).with_link("c", 1.0),
            GlyphRecord::new("b", 18.0).with_link("c", 0.5),
            GlyphRecord::new("c", 14.0),
            GlyphRecord::new("d", 10.0),
        ]);
        let items = layout.items();
        for i in 0..items.len() {
            for j in (i + 1)..items.len() {
                let a = items[i].borrow();
                let b = items[j].borrow();
                let distance = a.target.distance(b.target);
                assert!(
                    distance >= a.radius() + b.radius() - 1.0,
                    "items {i} and {j} overlap"
                );
            }
        }
    }

    #[test]
    fn coincident_seeds_produce_no_nan() {
        // Every item starts at the origin; seeding must spread them apart
        // deterministically before forces apply.
        let layout = solved(vec![
            GlyphRecord::new("a", 10.0),
            GlyphRecord::new("b", 10.0),
            GlyphRecord::new("c", 10.0),
        ]);
        for item in layout.items() {
            assert!(item.borrow().target.is_finite());
        }
    }

    #[test]
    fn single_item_rests_at_center() {
        let layout = solved(vec![GlyphRecord::new("a", 10.0)]);
        assert_eq!(layout.items()[0].borrow().target, Point::zero());
    }
}
