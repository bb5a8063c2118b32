// SPDX-License-Identifier: MIT OR Apache-2.0
//! Radial ring packing.
//!
//! Items are sorted by descending radius and packed into concentric
//! rings. The center ring holds exactly one item at the layout center;
//! every further ring is a genuine annulus whose capacity is the sum of
//! the angles its members subtend.

use crate::item::{GlyphRecord, ItemHandle};
use crate::layout::{make_item, LayoutAlgorithm, LayoutError};
use coterie_scene::geometry::Point;
use coterie_scene::node::NodeId;
use std::f64::consts::TAU;

/// One ring of the packing.
#[derive(Debug, Clone)]
pub struct Orbit {
    /// Distance from the layout center to member item centers. Zero for
    /// the center ring.
    pub center_radius: f64,
    /// Inner edge of the annulus
    pub inner_radius: f64,
    /// Outer edge of the annulus
    pub outer_radius: f64,
    /// Member item indices into the layout's item list
    pub members: Vec<usize>,
    /// Distribute members evenly over the full circle instead of packing
    /// them contiguously
    pub evenly: bool,
    used_angle: f64,
}

impl Orbit {
    /// Total subtended angle consumed by the ring's members
    pub fn used_angle(&self) -> f64 {
        self.used_angle
    }
}

/// Angle an item of radius `r` subtends on a ring of center radius `ring`.
///
/// The asin input is clamped so oversized items cost at most a half
/// circle instead of producing NaN.
fn subtended_angle(radius: f64, ring_radius: f64) -> f64 {
    if ring_radius <= 0.0 {
        return TAU;
    }
    2.0 * (radius / ring_radius).clamp(0.0, 1.0).asin()
}

/// The radial ring packing layout.
pub struct OrbitalLayout {
    items: Vec<ItemHandle>,
    center: Point,
    padding: f64,
    evenly: bool,
    orbits: Vec<Orbit>,
}

impl OrbitalLayout {
    /// Create a layout with default padding
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            center: Point::zero(),
            padding: 10.0,
            evenly: true,
            orbits: Vec::new(),
        }
    }

    /// Set the gap between consecutive rings
    pub fn with_padding(mut self, padding: f64) -> Self {
        self.padding = padding.max(0.0);
        self
    }

    /// Choose between even distribution and contiguous packing for new
    /// rings
    pub fn with_even_distribution(mut self, evenly: bool) -> Self {
        self.evenly = evenly;
        self
    }

    /// The rings created by the last [`LayoutAlgorithm::compute_targets`]
    /// pass. Index 0 is the center ring and always holds exactly one item.
    pub fn orbits(&self) -> &[Orbit] {
        &self.orbits
    }

    /// Configured ring gap
    pub fn padding(&self) -> f64 {
        self.padding
    }
}

impl Default for OrbitalLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutAlgorithm for OrbitalLayout {
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
        self.orbits.clear();
    }

    fn items(&self) -> &[ItemHandle] {
        &self.items
    }

    fn compute_targets(&mut self) {
        self.orbits.clear();
        if self.items.is_empty() {
            return;
        }

        // Largest first; ties keep insertion order.
        let mut order: Vec<usize> = (0..self.items.len()).collect();
        order.sort_by(|a, b| {
            let ra = self.items[*a].borrow().radius();
            let rb = self.items[*b].borrow().radius();
            rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
        });

        // The center ring holds the single largest item at the exact
        // center.
        let first = order[0];
        let first_radius = self.items[first].borrow().radius();
        self.items[first].borrow_mut().target = self.center;
        self.orbits.push(Orbit {
            center_radius: 0.0,
            inner_radius: 0.0,
            outer_radius: first_radius,
            members: vec![first],
            evenly: self.evenly,
            used_angle: TAU,
        });

        for &index in &order[1..] {
            let radius = self.items[index].borrow().radius();
            loop {
                let current = self.orbits.last_mut().expect("center ring exists");
                let open = current.center_radius > 0.0;
                if open {
                    let cost = subtended_angle(radius, current.center_radius);
                    if current.used_angle + cost <= TAU {
                        current.used_angle += cost;
                        current.members.push(index);
                        current.outer_radius =
                            current.outer_radius.max(current.inner_radius + 2.0 * radius);
                        break;
                    }
                }
                // Ring is full (or is the center ring): open a new annulus
                // whose first member is the largest remaining item.
                let inner = self.orbits.last().expect("center ring exists").outer_radius
                    + self.padding;
                self.orbits.push(Orbit {
                    center_radius: inner + radius,
                    inner_radius: inner,
                    outer_radius: inner + 2.0 * radius,
                    members: Vec::new(),
                    evenly: self.evenly,
                    used_angle: 0.0,
                });
            }
        }

        // Assign angles ring by ring. Rings are staggered so members of
        // consecutive rings do not line up radially.
        for (ring_index, orbit) in self.orbits.iter().enumerate().skip(1) {
            let start = -std::f64::consts::FRAC_PI_2 + ring_index as f64 * 0.5;
            let count = orbit.members.len();
            let mut packed_cursor = 0.0;
            for (slot, &member) in orbit.members.iter().enumerate() {
                let angle = if orbit.evenly {
                    start + slot as f64 * TAU / count as f64
                } else {
                    let cost = subtended_angle(
                        self.items[member].borrow().radius(),
                        orbit.center_radius,
                    );
                    let angle = start + packed_cursor + cost * 0.5;
                    packed_cursor += cost;
                    angle
                };
                self.items[member].borrow_mut().target =
                    self.center + Point::from_polar(orbit.center_radius, angle);
            }
        }
    }

    fn bounding_radius(&self) -> f64 {
        self.orbits
            .last()
            .map(|o| o.outer_radius)
            .unwrap_or_else(|| {
                self.items
                    .iter()
                    .map(|i| i.borrow().radius())
                    .fold(0.0, f64::max)
            })
    }

    fn center(&self) -> Point {
        self.center
    }

    fn set_center(&mut self, center: Point) {
        self.center = center;
    }
}
