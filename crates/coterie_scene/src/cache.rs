// SPDX-License-Identifier: MIT OR Apache-2.0
//! Raster cache state for cached nodes.

use crate::backend::{Backend, Layer};

/// Offscreen raster plus a dirty flag.
///
/// The cache is invalidated by changes that affect the rendered scale
/// (size, device scale, global scale) and by explicit redraw requests.
/// Position-only moves reuse the cached raster at a new screen offset,
/// which is the invariant that keeps per-frame cost low.
pub struct RasterCache {
    layer: Option<Box<dyn Layer>>,
    dirty: bool,
}

impl RasterCache {
    /// Create an empty, dirty cache
    pub fn new() -> Self {
        Self {
            layer: None,
            dirty: true,
        }
    }

    /// Whether the raster must be redrawn before the next blit
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the raster stale
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Mark the raster up to date
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// The backing layer, if one has been allocated
    pub fn layer(&self) -> Option<&dyn Layer> {
        self.layer.as_deref()
    }

    /// Get the layer sized to `width × height`, allocating or resizing as
    /// needed. A resize discards contents and leaves the cache dirty.
    pub fn ensure_layer(
        &mut self,
        backend: &mut dyn Backend,
        width: u32,
        height: u32,
    ) -> &mut dyn Layer {
        match &mut self.layer {
            Some(layer) => {
                if layer.size() != (width, height) {
                    layer.resize(width, height);
                    self.dirty = true;
                }
            }
            None => {
                self.layer = Some(backend.create_layer(width, height));
                self.dirty = true;
            }
        }
        self.layer.as_deref_mut().expect("layer allocated above")
    }
}

impl Default for RasterCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;

    #[test]
    fn starts_dirty_and_allocates_lazily() {
        let mut cache = RasterCache::new();
        assert!(cache.is_dirty());
        assert!(cache.layer().is_none());

        let mut backend = NullBackend;
        cache.ensure_layer(&mut backend, 32, 32);
        cache.mark_clean();
        assert!(!cache.is_dirty());
        assert_eq!(cache.layer().map(|l| l.size()), Some((32, 32)));
    }

    #[test]
    fn resize_re_dirties() {
        let mut cache = RasterCache::new();
        let mut backend = NullBackend;
        cache.ensure_layer(&mut backend, 32, 32);
        cache.mark_clean();
        cache.ensure_layer(&mut backend, 64, 64);
        assert!(cache.is_dirty());
    }
}
