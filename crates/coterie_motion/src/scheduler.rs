// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-frame registry of active tweens.

use crate::tween::{ContextId, Tween, TweenId, TweenState};
use indexmap::IndexMap;

/// Registry of active tweens, advanced once per frame tick.
///
/// Tweens advance in registration order within one tick; there is no
/// cross-tween ordering guarantee beyond that. Stopping is idempotent and
/// unregisters immediately, so no stale callback can fire afterwards.
pub struct Scheduler {
    active: IndexMap<TweenId, Tween>,
}

impl Scheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self {
            active: IndexMap::new(),
        }
    }

    /// Register a tween and mark it running
    pub fn start(&mut self, mut tween: Tween) -> TweenId {
        debug_assert_eq!(tween.state(), TweenState::Idle, "tween started twice");
        tween.state = TweenState::Running;
        let id = tween.id;
        self.active.insert(id, tween);
        id
    }

    /// Advance every active tween by `dt` seconds.
    ///
    /// Tweens that reach their duration are unregistered before their
    /// `end` callbacks run, and those callbacks receive the scheduler so
    /// completion chains can register follow-up tweens. Follow-ups first
    /// advance on the next tick.
    pub fn advance(&mut self, dt: f64) {
        let ids: Vec<TweenId> = self.active.keys().copied().collect();
        let mut finished = Vec::new();
        for id in ids {
            let Some(tween) = self.active.get_mut(&id) else {
                continue;
            };
            if tween.advance(dt) {
                finished.push(id);
            }
        }
        for id in finished {
            if let Some(mut tween) = self.active.shift_remove(&id) {
                tween.state = TweenState::Completed;
                if let Some(callback) = tween.on_end.take() {
                    callback(self);
                }
            }
        }
    }

    /// Stop a tween early, firing its `stop` callback.
    ///
    /// Idempotent: stopping an unknown or already-terminal tween is a
    /// no-op returning false.
    pub fn stop(&mut self, id: TweenId) -> bool {
        let Some(mut tween) = self.active.shift_remove(&id) else {
            return false;
        };
        tween.state = TweenState::Stopped;
        if let Some(callback) = tween.on_stop.take() {
            callback(self);
        }
        true
    }

    /// Stop every tween belonging to a context. Returns how many were
    /// stopped.
    pub fn stop_context(&mut self, context: ContextId) -> usize {
        let ids: Vec<TweenId> = self
            .active
            .values()
            .filter(|t| t.context == context)
            .map(|t| t.id)
            .collect();
        let count = ids.len();
        for id in ids {
            self.stop(id);
        }
        if count > 0 {
            tracing::debug!("stopped {count} tween(s) in cancelled context");
        }
        count
    }

    /// Whether a tween is currently registered
    pub fn is_active(&self, id: TweenId) -> bool {
        self.active.contains_key(&id)
    }

    /// Number of active tweens
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of active tweens in a context
    pub fn context_count(&self, context: ContextId) -> usize {
        self.active.values().filter(|t| t.context == context).count()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
