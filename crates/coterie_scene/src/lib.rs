// SPDX-License-Identifier: MIT OR Apache-2.0
//! Retained-mode scene graph for Coterie.
//!
//! This crate provides the node tree a persona-glyph visualization is
//! composed from:
//! - Geometry value types (points, sizes, affine matrices, bounds)
//! - A reference-counted node arena with transform composition
//! - Raster caching with dirty-driven invalidation
//! - Publish/subscribe events with forwarding relays
//! - The host rendering surface contract
//!
//! ## Architecture
//!
//! Nodes are addressed by stable [`NodeId`] handles into a [`Scene`]
//! arena. Ownership along the parent→child edge is an explicit reference
//! count; the child→parent link is non-owning. Drawing is retained:
//! cached nodes re-render only when their raster is dirty, and
//! position-only moves never dirty a raster.

pub mod backend;
pub mod cache;
pub mod event;
pub mod geometry;
pub mod node;
pub mod unit;

pub use backend::{Backend, Canvas, Color, Layer, NullBackend, NullCanvas};
pub use cache::RasterCache;
pub use event::{Emitter, EmitterHandle, Event, Flow, HandlerId, RelayId};
pub use geometry::{Bounds, Matrix2D, MatrixStack, Point, Size};
pub use node::{Drawable, NodeContent, NodeId, Scene, SceneHandle};
pub use unit::Dim;
