// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host rendering surface contract.
//!
//! The engine never talks to a concrete graphics API. The embedding host
//! supplies a [`Canvas`] (a 2D context with paths, fill/stroke, clipping,
//! layer blits, and 6-value affine transforms) and a [`Backend`] that
//! allocates offscreen [`Layer`]s for raster caching. A [`NullBackend`] is
//! provided for headless use (tests, settling layouts before first draw).

use crate::geometry::{Matrix2D, Point};
use serde::{Deserialize, Serialize};
use std::any::Any;

/// An RGBA color with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    /// Red component
    pub r: f32,
    /// Green component
    pub g: f32,
    /// Blue component
    pub b: f32,
    /// Alpha component
    pub a: f32,
}

impl Color {
    /// Fully transparent black
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);
    /// Opaque white
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);

    /// Create a color from RGBA components
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Same color with a different alpha
    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }
}

/// A 2D drawing context supplied by the host surface.
pub trait Canvas {
    /// Replace the current transform
    fn set_transform(&mut self, m: Matrix2D);
    /// Compose a transform onto the current one
    fn concat_transform(&mut self, m: Matrix2D);
    /// Set the global alpha applied to subsequent drawing
    fn set_alpha(&mut self, alpha: f64);

    /// Start a new path
    fn begin_path(&mut self);
    /// Move the path cursor
    fn move_to(&mut self, p: Point);
    /// Add a line segment
    fn line_to(&mut self, p: Point);
    /// Add a circular arc (angles in radians)
    fn arc(&mut self, center: Point, radius: f64, start: f64, end: f64);
    /// Close the current subpath
    fn close_path(&mut self);

    /// Fill the current path
    fn fill(&mut self, color: Color);
    /// Stroke the current path
    fn stroke(&mut self, color: Color, width: f64);
    /// Clip subsequent drawing to the current path
    fn clip(&mut self);
    /// Clear the whole surface to a color
    fn clear(&mut self, color: Color);

    /// Blit an offscreen layer with the given transform and alpha.
    ///
    /// `transform` maps the layer's pixel space into the canvas.
    fn blit(&mut self, layer: &dyn Layer, transform: Matrix2D, alpha: f64);
}

/// An offscreen raster allocated by a [`Backend`].
pub trait Layer {
    /// Current raster size in physical pixels
    fn size(&self) -> (u32, u32);
    /// Resize the raster, discarding its contents
    fn resize(&mut self, width: u32, height: u32);
    /// Drawing context targeting this layer
    fn canvas(&mut self) -> &mut dyn Canvas;
    /// Backend-specific downcast hook used by [`Canvas::blit`]
    fn as_any(&self) -> &dyn Any;
}

/// Factory for offscreen layers.
pub trait Backend {
    /// Allocate a layer of the given pixel size
    fn create_layer(&mut self, width: u32, height: u32) -> Box<dyn Layer>;
}

// ---------------------------------------------------------------------------
// Headless backend
// ---------------------------------------------------------------------------

/// A canvas that discards every operation. Useful for headless runs.
#[derive(Debug, Default)]
pub struct NullCanvas;

impl Canvas for NullCanvas {
    fn set_transform(&mut self, _m: Matrix2D) {}
    fn concat_transform(&mut self, _m: Matrix2D) {}
    fn set_alpha(&mut self, _alpha: f64) {}
    fn begin_path(&mut self) {}
    fn move_to(&mut self, _p: Point) {}
    fn line_to(&mut self, _p: Point) {}
    fn arc(&mut self, _center: Point, _radius: f64, _start: f64, _end: f64) {}
    fn close_path(&mut self) {}
    fn fill(&mut self, _color: Color) {}
    fn stroke(&mut self, _color: Color, _width: f64) {}
    fn clip(&mut self) {}
    fn clear(&mut self, _color: Color) {}
    fn blit(&mut self, _layer: &dyn Layer, _transform: Matrix2D, _alpha: f64) {}
}

/// A layer with a size but no pixels.
#[derive(Debug)]
pub struct NullLayer {
    width: u32,
    height: u32,
    canvas: NullCanvas,
}

impl Layer for NullLayer {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn canvas(&mut self) -> &mut dyn Canvas {
        &mut self.canvas
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Backend allocating [`NullLayer`]s.
#[derive(Debug, Default)]
pub struct NullBackend;

impl Backend for NullBackend {
    fn create_layer(&mut self, width: u32, height: u32) -> Box<dyn Layer> {
        Box::new(NullLayer {
            width,
            height,
            canvas: NullCanvas,
        })
    }
}

// ---------------------------------------------------------------------------
// Recording backend
// ---------------------------------------------------------------------------

/// One recorded canvas operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// `set_transform` call
    SetTransform(Matrix2D),
    /// `concat_transform` call
    ConcatTransform(Matrix2D),
    /// `set_alpha` call
    SetAlpha(f64),
    /// `begin_path` call
    BeginPath,
    /// `move_to` call
    MoveTo(Point),
    /// `line_to` call
    LineTo(Point),
    /// `arc` call
    Arc {
        /// Arc center
        center: Point,
        /// Arc radius
        radius: f64,
    },
    /// `close_path` call
    ClosePath,
    /// `fill` call
    Fill(Color),
    /// `stroke` call
    Stroke(Color, f64),
    /// `clip` call
    Clip,
    /// `clear` call
    Clear(Color),
    /// `blit` call with the layer's size at blit time
    Blit {
        /// Layer pixel size
        layer_size: (u32, u32),
        /// Blit transform
        transform: Matrix2D,
        /// Blit alpha
        alpha: f64,
    },
}

/// A canvas that records every operation, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    /// Recorded operations in call order
    pub ops: Vec<DrawOp>,
}

impl RecordingCanvas {
    /// Create an empty recording canvas
    pub fn new() -> Self {
        Self::default()
    }

    /// Count recorded operations matching a predicate
    pub fn count(&self, pred: impl Fn(&DrawOp) -> bool) -> usize {
        self.ops.iter().filter(|op| pred(op)).count()
    }
}

impl Canvas for RecordingCanvas {
    fn set_transform(&mut self, m: Matrix2D) {
        self.ops.push(DrawOp::SetTransform(m));
    }

    fn concat_transform(&mut self, m: Matrix2D) {
        self.ops.push(DrawOp::ConcatTransform(m));
    }

    fn set_alpha(&mut self, alpha: f64) {
        self.ops.push(DrawOp::SetAlpha(alpha));
    }

    fn begin_path(&mut self) {
        self.ops.push(DrawOp::BeginPath);
    }

    fn move_to(&mut self, p: Point) {
        self.ops.push(DrawOp::MoveTo(p));
    }

    fn line_to(&mut self, p: Point) {
        self.ops.push(DrawOp::LineTo(p));
    }

    fn arc(&mut self, center: Point, radius: f64, _start: f64, _end: f64) {
        self.ops.push(DrawOp::Arc { center, radius });
    }

    fn close_path(&mut self) {
        self.ops.push(DrawOp::ClosePath);
    }

    fn fill(&mut self, color: Color) {
        self.ops.push(DrawOp::Fill(color));
    }

    fn stroke(&mut self, color: Color, width: f64) {
        self.ops.push(DrawOp::Stroke(color, width));
    }

    fn clip(&mut self) {
        self.ops.push(DrawOp::Clip);
    }

    fn clear(&mut self, color: Color) {
        self.ops.push(DrawOp::Clear(color));
    }

    fn blit(&mut self, layer: &dyn Layer, transform: Matrix2D, alpha: f64) {
        self.ops.push(DrawOp::Blit {
            layer_size: layer.size(),
            transform,
            alpha,
        });
    }
}

/// A layer recording the drawing done into it.
#[derive(Debug)]
pub struct RecordingLayer {
    width: u32,
    height: u32,
    /// Canvas targeting this layer
    pub canvas: RecordingCanvas,
}

impl Layer for RecordingLayer {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.canvas.ops.clear();
    }

    fn canvas(&mut self) -> &mut dyn Canvas {
        &mut self.canvas
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Backend allocating [`RecordingLayer`]s.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    /// Number of layers allocated so far
    pub layers_created: usize,
}

impl Backend for RecordingBackend {
    fn create_layer(&mut self, width: u32, height: u32) -> Box<dyn Layer> {
        self.layers_created += 1;
        Box::new(RecordingLayer {
            width,
            height,
            canvas: RecordingCanvas::new(),
        })
    }
}
