// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-frame driver tying scene, scheduler and stack together.
//!
//! The host rendering surface calls [`Stage::tick`] once per frame with
//! the elapsed delta and its drawing context. The tick order is fixed:
//! scheduler advance, then the active layout's physics/solver step, then
//! drawing (dirty caches redraw, clean ones blit), then the autorelease
//! drain. Everything runs on the calling thread; asynchronous resource
//! work must resolve between ticks, never during one.

use crate::layout::{Layout, LayoutKind};
use crate::stack::LayoutStack;
use coterie_motion::{ContextId, Scheduler};
use coterie_scene::backend::{Backend, Canvas};
use coterie_scene::geometry::Size;
use coterie_scene::{Scene, SceneHandle};

/// The engine's frame driver.
pub struct Stage {
    scene: SceneHandle,
    scheduler: Scheduler,
    stack: LayoutStack,
    backend: Box<dyn Backend>,
}

impl Stage {
    /// Create a stage with its own scene sized to the viewport
    pub fn new(viewport: Size, backend: Box<dyn Backend>) -> Self {
        let scene = Scene::handle(viewport);
        let stack = LayoutStack::new(scene.clone());
        Self {
            scene,
            scheduler: Scheduler::new(),
            stack,
            backend,
        }
    }

    /// Shared handle to the stage's scene
    pub fn scene(&self) -> SceneHandle {
        self.scene.clone()
    }

    /// The tween scheduler
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The tween scheduler, mutably
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// The layout stack
    pub fn stack(&self) -> &LayoutStack {
        &self.stack
    }

    /// The layout stack, mutably
    pub fn stack_mut(&mut self) -> &mut LayoutStack {
        &mut self.stack
    }

    /// Resize the viewport the scene resolves against
    pub fn set_viewport(&mut self, viewport: Size) {
        self.scene.borrow_mut().set_viewport(viewport);
    }

    /// Push a layout onto the stack. See [`LayoutStack::push_layout`].
    pub fn push_layout(
        &mut self,
        layout: Layout,
        sub_layouts: Vec<Layout>,
        animated: bool,
        source_item: Option<&str>,
        auto_zoom: bool,
        metadata: Option<serde_json::Value>,
    ) {
        self.stack.push_layout(
            layout,
            sub_layouts,
            animated,
            source_item,
            auto_zoom,
            metadata,
            &mut self.scheduler,
        );
    }

    /// Pop layouts off the stack. See [`LayoutStack::pop_layout`].
    pub fn pop_layout(&mut self, count: usize, animated: bool, auto_zoom: bool) {
        self.stack
            .pop_layout(count, animated, auto_zoom, &mut self.scheduler);
    }

    /// Switch the layout kind for the whole stack. See
    /// [`LayoutStack::set_kind`].
    pub fn set_kind(&mut self, kind: LayoutKind) {
        self.stack.set_kind(kind, &mut self.scheduler);
    }

    /// Re-place the innermost layout's items, optionally animated
    pub fn position_top(&mut self, animated: bool) {
        let scene = self.scene.clone();
        if let Some(layout) = self.stack.top_layout_mut() {
            layout.position_items(animated, &mut self.scheduler, &scene, ContextId::new());
        }
    }

    /// One frame: advance tweens, step the active layout, draw, drain
    /// deferred releases.
    pub fn tick(&mut self, dt: f64, canvas: &mut dyn Canvas) {
        self.scheduler.advance(dt);
        self.stack.step(dt);
        self.scene.borrow_mut().draw(canvas, self.backend.as_mut());
        self.scene.borrow_mut().drain_autorelease();
    }
}
