// SPDX-License-Identifier: MIT OR Apache-2.0
//! Continuous body simulation.
//!
//! Every item is a circular body with mass from its radius and the layout
//! density. The largest item (the "king") is pinned at the layout center;
//! an attractor pulls all other bodies toward it and collision response
//! keeps them from overlapping. The simulation is stepped with a fixed
//! timestep fed by an accumulator, so results are reproducible regardless
//! of the host's frame cadence.

use crate::item::{GlyphRecord, ItemHandle};
use crate::layout::{make_item, LayoutAlgorithm, LayoutError};
use coterie_scene::geometry::{Point, GEOM_EPSILON};
use coterie_scene::node::NodeId;

/// Fixed simulation timestep in seconds
pub const FIXED_DT: f64 = 1.0 / 60.0;

/// Largest frame delta fed into the accumulator; protects against spiral
/// of death after a long host stall.
const MAX_FRAME_DELTA: f64 = 0.25;

/// Bounded number of fixed steps a non-animated placement fast-forwards.
///
/// Tuned for visual settling, not a semantic guarantee.
pub const SETTLE_STEPS: usize = 240;

/// Peak speed below which the simulation counts as settled, px/s
const SETTLE_SPEED_EPS: f64 = 0.5;

/// Deterministic insertion angle increment
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// Speed given to a newly inserted body, pointing outward so arrival
/// reads as a swing-in rather than a teleport
const INSERT_SPEED: f64 = 60.0;

/// Gap left outside the furthest extent when inserting
const INSERT_MARGIN: f64 = 12.0;

/// The continuous simulation layout.
pub struct PhysicalLayout {
    items: Vec<ItemHandle>,
    center: Point,
    density: f64,
    attraction: f64,
    damping: f64,
    restitution: f64,
    accumulator: f64,
    inserted: usize,
    king: Option<usize>,
}

impl PhysicalLayout {
    /// Create a layout with default tuning
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            center: Point::zero(),
            density: 1.0,
            attraction: 140.0,
            damping: 0.92,
            restitution: 0.2,
            accumulator: 0.0,
            inserted: 0,
            king: None,
        }
    }

    /// Set the attractor strength (px/s² toward the center)
    pub fn with_attraction(mut self, attraction: f64) -> Self {
        self.attraction = attraction.max(0.0);
        self
    }

    /// Set the mass density (mass = density · radius²)
    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density.max(GEOM_EPSILON);
        self
    }

    /// Index of the pinned king item, when any item exists
    pub fn king(&self) -> Option<usize> {
        self.king
    }

    /// Furthest extent of the simulation: distance from center to the far
    /// edge of the outermost body
    fn furthest_extent(&self) -> f64 {
        self.items
            .iter()
            .map(|i| {
                let item = i.borrow();
                item.position.distance(self.center) + item.radius()
            })
            .fold(0.0, f64::max)
    }

    fn crown(&mut self, index: usize) {
        if let Some(old) = self.king {
            let mut old_king = self.items[old].borrow_mut();
            old_king.body.pinned = false;
            old_king.body.inv_mass = 1.0 / old_king.body.mass.max(GEOM_EPSILON);
        }
        {
            let mut item = self.items[index].borrow_mut();
            item.body.pinned = true;
            item.body.inv_mass = 0.0;
            item.body.velocity = Point::zero();
            item.position = self.center;
            item.target = self.center;
        }
        self.king = Some(index);
    }

    /// One fixed step of the simulation.
    fn substep(&mut self) {
        let dt = FIXED_DT;

        // Attraction toward the center and integration.
        for handle in &self.items {
            let mut item = handle.borrow_mut();
            if item.body.pinned {
                item.position = self.center;
                item.body.velocity = Point::zero();
                continue;
            }
            let toward = (self.center - item.position).normalized();
            let velocity = item.body.velocity + toward * self.attraction * dt;
            item.body.velocity = velocity * self.damping;
            let velocity = item.body.velocity;
            item.position += velocity * dt;
        }

        // Pairwise collision response.
        for i in 0..self.items.len() {
            for j in (i + 1)..self.items.len() {
                let (pi, pj, ri, rj, inv_i, inv_j) = {
                    let a = self.items[i].borrow();
                    let b = self.items[j].borrow();
                    (
                        a.position,
                        b.position,
                        a.radius(),
                        b.radius(),
                        a.body.inv_mass,
                        b.body.inv_mass,
                    )
                };
                let total_inv = inv_i + inv_j;
                if total_inv <= 0.0 {
                    continue;
                }

                let delta = pj - pi;
                let distance = delta.length();
                let min_distance = ri + rj;
                if distance >= min_distance {
                    continue;
                }

                // Coincident centers get a fixed axis instead of NaN.
                let normal = if distance > GEOM_EPSILON {
                    delta * (1.0 / distance)
                } else {
                    Point::new(1.0, 0.0)
                };
                let depth = min_distance - distance;

                // Positional correction, weighted by inverse mass.
                let correction = normal * (depth * 0.8 / total_inv);
                {
                    let mut a = self.items[i].borrow_mut();
                    a.position = a.position - correction * inv_i;
                }
                {
                    let mut b = self.items[j].borrow_mut();
                    b.position = b.position + correction * inv_j;
                }

                // Impulse along the normal when the pair is approaching.
                let vi = self.items[i].borrow().body.velocity;
                let vj = self.items[j].borrow().body.velocity;
                let approach = (vi - vj).dot(normal);
                if approach > 0.0 {
                    let magnitude = (1.0 + self.restitution) * approach / total_inv;
                    let impulse = normal * magnitude;
                    {
                        let mut a = self.items[i].borrow_mut();
                        let v = a.body.velocity - impulse * inv_i;
                        a.body.velocity = v;
                    }
                    {
                        let mut b = self.items[j].borrow_mut();
                        let v = b.body.velocity + impulse * inv_j;
                        b.body.velocity = v;
                    }
                }
            }
        }
    }

    /// Fastest body speed, px/s
    fn peak_speed(&self) -> f64 {
        self.items
            .iter()
            .map(|i| i.borrow().body.velocity.length())
            .fold(0.0, f64::max)
    }
}

impl Default for PhysicalLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutAlgorithm for PhysicalLayout {
    fn add_item(&mut self, record: GlyphRecord, node: NodeId) -> Result<ItemHandle, LayoutError> {
        let item = make_item(&self.items, record, node)?;
        {
            let mut entry = item.borrow_mut();
            let radius = entry.radius();
            entry.body.mass = self.density * radius * radius;
            entry.body.inv_mass = 1.0 / entry.body.mass.max(GEOM_EPSILON);

            // Insert just outside the furthest extent with an outward
            // velocity; the attractor swings the body back in.
            let angle = self.inserted as f64 * GOLDEN_ANGLE;
            let distance = self.furthest_extent() + radius + INSERT_MARGIN;
            let direction = Point::from_polar(1.0, angle);
            entry.position = self.center + direction * distance;
            entry.target = entry.position;
            entry.body.velocity = direction * INSERT_SPEED;
        }
        self.inserted += 1;
        self.items.push(item.clone());

        let index = self.items.len() - 1;
        let is_heir = match self.king {
            Some(king) => {
                item.borrow().radius() > self.items[king].borrow().radius()
            }
            None => true,
        };
        if is_heir {
            self.crown(index);
        }
        Ok(item)
    }

    fn remove_item(&mut self, id: &str) -> Option<ItemHandle> {
        let index = self.items.iter().position(|i| i.borrow().record.id == id)?;
        let removed = self.items.remove(index);

        // Re-crown when the king left, and fix up the stored index.
        match self.king {
            Some(king) if king == index => {
                self.king = None;
                let heir = (0..self.items.len()).max_by(|a, b| {
                    let ra = self.items[*a].borrow().radius();
                    let rb = self.items[*b].borrow().radius();
                    ra.partial_cmp(&rb).unwrap_or(std::cmp::Ordering::Equal)
                });
                if let Some(heir) = heir {
                    self.crown(heir);
                }
            }
            Some(king) if king > index => self.king = Some(king - 1),
            _ => {}
        }
        Some(removed)
    }

    fn remove_all_items(&mut self) {
        self.items.clear();
        self.king = None;
        self.accumulator = 0.0;
        self.inserted = 0;
    }

    fn items(&self) -> &[ItemHandle] {
        &self.items
    }

    fn compute_targets(&mut self) {
        // The simulation is the ground truth: targets mirror positions.
        for item in &self.items {
            let mut item = item.borrow_mut();
            let position = item.position;
            item.target = position;
        }
    }

    fn step(&mut self, dt: f64) {
        self.accumulator += dt.clamp(0.0, MAX_FRAME_DELTA);
        while self.accumulator >= FIXED_DT {
            self.substep();
            self.accumulator -= FIXED_DT;
        }
    }

    fn settle(&mut self) {
        let mut steps = 0;
        for _ in 0..SETTLE_STEPS {
            self.substep();
            steps += 1;
            if self.peak_speed() < SETTLE_SPEED_EPS {
                break;
            }
        }
        tracing::debug!(steps, "physical layout fast-forwarded to rest");
        self.accumulator = 0.0;
        self.compute_targets();
    }

    fn bounding_radius(&self) -> f64 {
        self.furthest_extent()
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
