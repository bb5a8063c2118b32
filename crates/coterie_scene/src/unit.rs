// SPDX-License-Identifier: MIT OR Apache-2.0
//! Absolute-or-percentage dimensions.

use serde::{Deserialize, Serialize};

/// A dimension that is either an absolute pixel value or a percentage of
/// the parent's resolved pixel size.
///
/// Percentages resolve against the *parent*, which forces top-down
/// resolution order through the scene tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Dim {
    /// Absolute pixels
    Px(f64),
    /// Percentage of the parent's resolved size (100.0 == whole parent)
    Percent(f64),
}

impl Dim {
    /// Resolve against the parent's pixel size
    pub fn resolve(&self, parent: f64) -> f64 {
        match self {
            Dim::Px(v) => *v,
            Dim::Percent(p) => parent * p / 100.0,
        }
    }

    /// True for the percentage variant
    pub fn is_percent(&self) -> bool {
        matches!(self, Dim::Percent(_))
    }
}

impl Default for Dim {
    fn default() -> Self {
        Dim::Px(0.0)
    }
}

impl From<f64> for Dim {
    fn from(v: f64) -> Self {
        Dim::Px(v)
    }
}
