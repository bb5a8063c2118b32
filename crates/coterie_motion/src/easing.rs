// SPDX-License-Identifier: MIT OR Apache-2.0
//! Easing curves mapping normalized time to progress.

use serde::{Deserialize, Serialize};

/// An easing curve.
///
/// Curves map normalized elapsed time in `0.0..=1.0` to a progress value.
/// `BackOut` and `Elastic` intentionally overshoot past 1.0 before
/// settling; every curve starts at 0.0 and ends at exactly 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Easing {
    /// Constant-rate interpolation
    #[default]
    Linear,
    /// Quadratic ease-in
    QuadIn,
    /// Quadratic ease-out
    QuadOut,
    /// Quadratic ease-in-out
    QuadInOut,
    /// Cubic ease-in
    CubicIn,
    /// Cubic ease-out
    CubicOut,
    /// Cubic ease-in-out
    CubicInOut,
    /// Ease-out with a single overshoot past the target
    BackOut,
    /// Exponentially damped oscillation around the target
    Elastic,
    /// Bouncing settle onto the target
    Bounce,
}

impl Easing {
    /// Evaluate the curve. Input is clamped to `0.0..=1.0`.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::QuadIn => t * t,
            Easing::QuadOut => t * (2.0 - t),
            Easing::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    let u = -2.0 * t + 2.0;
                    1.0 - u * u / 2.0
                }
            }
            Easing::CubicIn => t * t * t,
            Easing::CubicOut => {
                let u = 1.0 - t;
                1.0 - u * u * u
            }
            Easing::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    let u = -2.0 * t + 2.0;
                    1.0 - u * u * u / 2.0
                }
            }
            Easing::BackOut => {
                const C1: f64 = 1.70158;
                const C3: f64 = C1 + 1.0;
                let u = t - 1.0;
                1.0 + C3 * u * u * u + C1 * u * u
            }
            Easing::Elastic => {
                const C4: f64 = std::f64::consts::TAU / 3.0;
                if t <= 0.0 {
                    0.0
                } else if t >= 1.0 {
                    1.0
                } else {
                    (2.0_f64).powf(-10.0 * t) * ((t * 10.0 - 0.75) * C4).sin() + 1.0
                }
            }
            Easing::Bounce => {
                const N1: f64 = 7.5625;
                const D1: f64 = 2.75;
                let mut t = t;
                if t < 1.0 / D1 {
                    N1 * t * t
                } else if t < 2.0 / D1 {
                    t -= 1.5 / D1;
                    N1 * t * t + 0.75
                } else if t < 2.5 / D1 {
                    t -= 2.25 / D1;
                    N1 * t * t + 0.9375
                } else {
                    t -= 2.625 / D1;
                    N1 * t * t + 0.984375
                }
            }
        }
    }
}

/// Linear interpolation between two floats
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}
