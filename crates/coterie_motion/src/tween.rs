// SPDX-License-Identifier: MIT OR Apache-2.0
//! Time-driven interpolators.

use crate::easing::Easing;
use crate::scheduler::Scheduler;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tween
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TweenId(pub Uuid);

impl TweenId {
    /// Create a new random tween ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TweenId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier of the context a tween belongs to.
///
/// Contexts group tweens owned by the same choreography so all of them can
/// be cancelled in one call when a new transition takes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(pub Uuid);

impl ContextId {
    /// Create a new random context ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

/// Tween lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TweenState {
    /// Built but not yet started
    #[default]
    Idle,
    /// Registered with a scheduler and advancing
    Running,
    /// Reached its duration; terminal
    Completed,
    /// Explicitly stopped before completion; terminal
    Stopped,
}

/// Terminal callback, invoked exactly once after the tween is
/// unregistered. Receives the scheduler so completion chains can start
/// follow-up tweens.
pub type TerminalFn = Box<dyn FnOnce(&mut Scheduler)>;

/// A time-driven interpolator.
///
/// Each frame the owning scheduler advances the tween by the elapsed
/// delta, maps normalized time through the easing curve and invokes the
/// update callback with the resulting progress. Reaching the duration
/// unregisters the tween and fires the `end` callback; an explicit stop
/// fires the `stop` callback instead. Update callbacks are never invoked
/// after either terminal event.
pub struct Tween {
    /// Unique id
    pub id: TweenId,
    /// Owning context
    pub context: ContextId,
    duration: f64,
    delay: f64,
    speed: f64,
    easing: Easing,
    elapsed: f64,
    pub(crate) state: TweenState,
    on_update: Option<Box<dyn FnMut(f64)>>,
    pub(crate) on_end: Option<TerminalFn>,
    pub(crate) on_stop: Option<TerminalFn>,
}

impl Tween {
    /// Create a tween with the given duration in seconds
    pub fn new(duration: f64) -> Self {
        Self {
            id: TweenId::new(),
            context: ContextId::new(),
            duration: duration.max(0.0),
            delay: 0.0,
            speed: 1.0,
            easing: Easing::Linear,
            elapsed: 0.0,
            state: TweenState::Idle,
            on_update: None,
            on_end: None,
            on_stop: None,
        }
    }

    /// Set the easing curve
    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    /// Assign the tween to a context
    pub fn with_context(mut self, context: ContextId) -> Self {
        self.context = context;
        self
    }

    /// Delay the start by `delay` seconds of scaled time
    pub fn with_delay(mut self, delay: f64) -> Self {
        self.delay = delay.max(0.0);
        self
    }

    /// Scale the tween's time by a playback speed multiplier
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed.max(0.0);
        self
    }

    /// Set the per-frame update callback
    pub fn on_update(mut self, callback: impl FnMut(f64) + 'static) -> Self {
        self.on_update = Some(Box::new(callback));
        self
    }

    /// Set the completion callback
    pub fn on_end(mut self, callback: impl FnOnce(&mut Scheduler) + 'static) -> Self {
        self.on_end = Some(Box::new(callback));
        self
    }

    /// Set the early-stop callback
    pub fn on_stop(mut self, callback: impl FnOnce(&mut Scheduler) + 'static) -> Self {
        self.on_stop = Some(Box::new(callback));
        self
    }

    /// Current state
    pub fn state(&self) -> TweenState {
        self.state
    }

    /// Configured duration in seconds
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Advance by `dt` seconds. Returns true when the duration has been
    /// reached; the caller unregisters the tween and fires its terminal
    /// callback.
    pub(crate) fn advance(&mut self, dt: f64) -> bool {
        let mut scaled = dt * self.speed;
        if self.delay > 0.0 {
            if scaled < self.delay {
                self.delay -= scaled;
                return false;
            }
            scaled -= self.delay;
            self.delay = 0.0;
        }
        self.elapsed += scaled;

        let done = self.elapsed >= self.duration;
        let t = if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        };
        let progress = self.easing.apply(t);
        if let Some(update) = &mut self.on_update {
            update(progress);
        }
        done
    }
}
