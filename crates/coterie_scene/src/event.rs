// SPDX-License-Identifier: MIT OR Apache-2.0
//! Publish/subscribe events with forwarding relays.
//!
//! Every scene node (and any other interested object) owns an [`Emitter`].
//! Handlers subscribe to a named event or, with a `None` selector, to all
//! events. Forwarding re-emits a descendant emitter's events from an
//! ancestor without per-level wiring; each forward is an explicit relay
//! that must be torn down with [`Emitter::unforward`].

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use uuid::Uuid;

/// Unique identifier for a registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerId(pub Uuid);

impl HandlerId {
    /// Create a new random handler ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a forwarding relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelayId(pub Uuid);

impl RelayId {
    /// Create a new random relay ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RelayId {
    fn default() -> Self {
        Self::new()
    }
}

/// An emitted event: a name plus an opaque JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event name, e.g. `"child-added"`
    pub name: String,
    /// Opaque payload for the consumer
    pub payload: serde_json::Value,
}

impl Event {
    /// Create an event without a payload
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// Create an event carrying a payload
    pub fn with_payload(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Handler verdict: continue to later handlers or stop this emit.
///
/// Stopping halts later handlers of the *same* emit only; it does not
/// suppress forwarding relays that already ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep invoking subsequent handlers
    Continue,
    /// Halt subsequent handlers for this emit
    Stop,
}

type HandlerFn = Box<dyn FnMut(&Event) -> Flow>;

struct HandlerEntry {
    id: HandlerId,
    /// `None` subscribes to all events ("omni" handler)
    filter: Option<String>,
    /// Taken out of the entry while the handler runs, so reentrant emits
    /// skip it instead of recursing.
    callback: Option<HandlerFn>,
}

struct RelayEntry {
    id: RelayId,
    source: Weak<RefCell<Emitter>>,
    source_handler: HandlerId,
}

/// A publish/subscribe event emitter.
pub struct Emitter {
    handlers: Vec<HandlerEntry>,
    relays: Vec<RelayEntry>,
}

/// Shared handle to an emitter.
pub type EmitterHandle = Rc<RefCell<Emitter>>;

impl Emitter {
    /// Create an emitter with no subscribers
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            relays: Vec::new(),
        }
    }

    /// Create a shared emitter handle
    pub fn handle() -> EmitterHandle {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Subscribe to a named event, or to all events with `None`.
    pub fn on(
        &mut self,
        event: Option<&str>,
        callback: impl FnMut(&Event) -> Flow + 'static,
    ) -> HandlerId {
        let id = HandlerId::new();
        self.handlers.push(HandlerEntry {
            id,
            filter: event.map(str::to_owned),
            callback: Some(Box::new(callback)),
        });
        id
    }

    /// Remove a handler. Returns whether it existed.
    pub fn off(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| h.id != id);
        before != self.handlers.len()
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Number of active forwarding relays
    pub fn relay_count(&self) -> usize {
        self.relays.len()
    }

    fn take_callback(&mut self, id: HandlerId) -> Option<HandlerFn> {
        self.handlers
            .iter_mut()
            .find(|h| h.id == id)
            .and_then(|h| h.callback.take())
    }

    fn restore_callback(&mut self, id: HandlerId, callback: HandlerFn) {
        // Dropped silently when the handler removed itself mid-call.
        if let Some(entry) = self.handlers.iter_mut().find(|h| h.id == id) {
            entry.callback = Some(callback);
        }
    }

    /// Emit an event through a shared handle.
    ///
    /// Named handlers run first in registration order, then omni handlers;
    /// a [`Flow::Stop`] verdict halts the remainder. Handlers registered
    /// during the emit are not invoked until the next emit.
    pub fn emit(handle: &EmitterHandle, event: &Event) -> Flow {
        let ordered: Vec<HandlerId> = {
            let emitter = handle.borrow();
            let named = emitter
                .handlers
                .iter()
                .filter(|h| h.filter.as_deref() == Some(event.name.as_str()));
            let omni = emitter.handlers.iter().filter(|h| h.filter.is_none());
            named.chain(omni).map(|h| h.id).collect()
        };

        for id in ordered {
            let Some(mut callback) = handle.borrow_mut().take_callback(id) else {
                continue;
            };
            let verdict = callback(event);
            handle.borrow_mut().restore_callback(id, callback);
            if verdict == Flow::Stop {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Re-emit `source`'s events from `target`.
    ///
    /// `events` restricts forwarding to the named events; `None` forwards
    /// everything. The returned relay id must be passed to
    /// [`Emitter::unforward`] when the relationship ends, otherwise the
    /// listener installed on `source` leaks.
    pub fn forward(
        target: &EmitterHandle,
        source: &EmitterHandle,
        events: Option<Vec<String>>,
    ) -> RelayId {
        let relay_id = RelayId::new();
        let weak_target = Rc::downgrade(target);
        let source_handler = source.borrow_mut().on(None, move |event: &Event| {
            if let Some(names) = &events {
                if !names.iter().any(|n| n == &event.name) {
                    return Flow::Continue;
                }
            }
            if let Some(target) = weak_target.upgrade() {
                Emitter::emit(&target, event);
            }
            Flow::Continue
        });
        target.borrow_mut().relays.push(RelayEntry {
            id: relay_id,
            source: Rc::downgrade(source),
            source_handler,
        });
        relay_id
    }

    /// Tear down a forwarding relay. Returns whether it existed.
    pub fn unforward(target: &EmitterHandle, relay: RelayId) -> bool {
        let entry = {
            let mut emitter = target.borrow_mut();
            let index = emitter.relays.iter().position(|r| r.id == relay);
            index.map(|i| emitter.relays.remove(i))
        };
        let Some(entry) = entry else {
            return false;
        };
        if let Some(source) = entry.source.upgrade() {
            source.borrow_mut().off(entry.source_handler);
        }
        true
    }

    /// Tear down every relay `target` holds on `source`.
    pub fn unforward_source(target: &EmitterHandle, source: &EmitterHandle) {
        let ids: Vec<RelayId> = target
            .borrow()
            .relays
            .iter()
            .filter(|r| {
                r.source
                    .upgrade()
                    .is_some_and(|s| Rc::ptr_eq(&s, source))
            })
            .map(|r| r.id)
            .collect();
        for id in ids {
            Emitter::unforward(target, id);
        }
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn named_then_omni_order() {
        let emitter = Emitter::handle();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        emitter.borrow_mut().on(None, move |_| {
            l.borrow_mut().push("omni");
            Flow::Continue
        });
        let l = log.clone();
        emitter.borrow_mut().on(Some("click"), move |_| {
            l.borrow_mut().push("named");
            Flow::Continue
        });

        Emitter::emit(&emitter, &Event::new("click"));
        assert_eq!(*log.borrow(), vec!["named", "omni"]);
    }

    #[test]
    fn stop_halts_subsequent_handlers() {
        let emitter = Emitter::handle();
        let second_ran = Rc::new(Cell::new(false));

        emitter.borrow_mut().on(Some("click"), |_| Flow::Stop);
        let flag = second_ran.clone();
        emitter.borrow_mut().on(Some("click"), move |_| {
            flag.set(true);
            Flow::Continue
        });

        let verdict = Emitter::emit(&emitter, &Event::new("click"));
        assert_eq!(verdict, Flow::Stop);
        assert!(!second_ran.get());
    }

    #[test]
    fn off_removes_handler() {
        let emitter = Emitter::handle();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let id = emitter.borrow_mut().on(Some("tick"), move |_| {
            c.set(c.get() + 1);
            Flow::Continue
        });

        Emitter::emit(&emitter, &Event::new("tick"));
        assert!(emitter.borrow_mut().off(id));
        Emitter::emit(&emitter, &Event::new("tick"));
        assert_eq!(count.get(), 1);
        assert!(!emitter.borrow_mut().off(id));
    }

    #[test]
    fn forward_re_emits_from_target() {
        let parent = Emitter::handle();
        let child = Emitter::handle();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = seen.clone();
        parent.borrow_mut().on(Some("click"), move |e| {
            s.borrow_mut().push(e.payload.clone());
            Flow::Continue
        });

        Emitter::forward(&parent, &child, None);
        Emitter::emit(
            &child,
            &Event::with_payload("click", serde_json::json!({"glyph": "ada"})),
        );
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0]["glyph"], "ada");
    }

    #[test]
    fn forward_filter_limits_events() {
        let parent = Emitter::handle();
        let child = Emitter::handle();
        let count = Rc::new(Cell::new(0));

        let c = count.clone();
        parent.borrow_mut().on(None, move |_| {
            c.set(c.get() + 1);
            Flow::Continue
        });

        Emitter::forward(&parent, &child, Some(vec!["click".to_owned()]));
        Emitter::emit(&child, &Event::new("click"));
        Emitter::emit(&child, &Event::new("hover"));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn unforward_tears_down_symmetrically() {
        let parent = Emitter::handle();
        let child = Emitter::handle();
        let count = Rc::new(Cell::new(0));

        let c = count.clone();
        parent.borrow_mut().on(None, move |_| {
            c.set(c.get() + 1);
            Flow::Continue
        });

        let relay = Emitter::forward(&parent, &child, None);
        assert_eq!(child.borrow().handler_count(), 1);

        assert!(Emitter::unforward(&parent, relay));
        assert_eq!(child.borrow().handler_count(), 0);
        assert_eq!(parent.borrow().relay_count(), 0);

        Emitter::emit(&child, &Event::new("click"));
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn dropped_target_does_not_break_source() {
        let child = Emitter::handle();
        {
            let parent = Emitter::handle();
            Emitter::forward(&parent, &child, None);
        }
        // The relay handler survives on the source but its target is gone;
        // emitting must not panic.
        Emitter::emit(&child, &Event::new("click"));
        assert_eq!(child.borrow().handler_count(), 1);
    }
}
