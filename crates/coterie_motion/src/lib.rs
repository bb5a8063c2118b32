// SPDX-License-Identifier: MIT OR Apache-2.0
//! Easing and tween scheduling for Coterie.
//!
//! This crate provides the time-driven half of the engine:
//! - Easing curves (linear, quadratic/cubic, back-overshoot, elastic, bounce)
//! - Tweens: interpolators with an idle → running → terminal state machine
//! - A per-frame scheduler advancing active tweens in registration order
//!
//! ## Architecture
//!
//! The host drives one [`Scheduler::advance`] call per frame with the
//! elapsed delta. Tweens are grouped by [`ContextId`] so a choreography can
//! cancel everything it owns in one call before starting a new transition.

pub mod easing;
pub mod scheduler;
pub mod tween;

pub use easing::{lerp, Easing};
pub use scheduler::Scheduler;
pub use tween::{ContextId, TerminalFn, Tween, TweenId, TweenState};
