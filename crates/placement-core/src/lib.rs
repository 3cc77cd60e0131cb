pub mod interaction;
pub mod mapper;

use overlay_model::OverlayStore;
use std::collections::BTreeMap;

/// On-screen rectangle of a rendered page surface, in viewport coordinates.
/// `width`/`height` are the page's rendered dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl SurfaceRect {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x <= self.left + self.width && y >= self.top && y <= self.top + self.height
    }
}

/// A page's fixed, document-intrinsic dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeSize {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub page: u32,
    pub surface: SurfaceRect,
    pub native: NativeSize,
}

/// Per-page-index record of rendered surface and native page size, keyed by
/// 1-based page index. Registration is idempotent and last-write-wins; the
/// renderer re-registers whenever layout changes.
#[derive(Debug, Clone, Default)]
pub struct PageGeometryRegistry {
    pages: BTreeMap<u32, PageGeometry>,
}

impl PageGeometryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a page's geometry. Non-positive rendered dimensions are
    /// rejected so every registered page satisfies `rendered > 0`.
    pub fn register(&mut self, page: u32, surface: SurfaceRect, native: NativeSize) {
        if surface.width <= 0.0 || surface.height <= 0.0 {
            return;
        }

        self.pages.insert(page, PageGeometry { page, surface, native });
    }

    /// Renderer geometry callback. Re-registers the page and rescales the
    /// render-space coordinates of overlays already placed on it by the ratio
    /// of new to old rendered dimensions, so they stay visually anchored to
    /// the same document location across viewport resize, zoom, and
    /// device-pixel-ratio changes.
    pub fn report_geometry(
        &mut self,
        overlays: &mut OverlayStore,
        page: u32,
        surface: SurfaceRect,
        native: NativeSize,
    ) {
        if surface.width <= 0.0 || surface.height <= 0.0 {
            return;
        }

        if let Some(previous) = self.pages.get(&page) {
            let scale_x = surface.width / previous.surface.width;
            let scale_y = surface.height / previous.surface.height;

            if scale_x != 1.0 || scale_y != 1.0 {
                overlays.rescale_page(page, scale_x, scale_y);
            }
        }

        self.pages.insert(page, PageGeometry { page, surface, native });
    }

    pub fn get(&self, page: u32) -> Option<&PageGeometry> {
        self.pages.get(&page)
    }

    /// Registered geometries in page order.
    pub fn all(&self) -> impl Iterator<Item = &PageGeometry> {
        self.pages.values()
    }

    /// First registered surface (in page order) containing the viewport
    /// point. This is the page a dragged overlay transfers to.
    pub fn surface_at(&self, x: f32, y: f32) -> Option<&PageGeometry> {
        self.pages.values().find(|geometry| geometry.surface.contains(x, y))
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
