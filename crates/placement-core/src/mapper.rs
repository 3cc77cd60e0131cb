//! Pure transforms between render space and a page's native space.
//!
//! Render space has its origin at the top-left of the page surface with Y
//! growing downward; native space has its origin at the bottom-left with Y
//! growing upward. `to_native` therefore anchors the overlay's bottom edge:
//! the native Y is `native_height - (render_y + render_height) * scale_y`.
//! Dropping that flip places signatures mirrored about the page's horizontal
//! center line.

use overlay_model::Overlay;

/// Axis-aligned rectangle in render-space pixels, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl From<&Overlay> for RenderRect {
    fn from(overlay: &Overlay) -> Self {
        Self { x: overlay.x, y: overlay.y, width: overlay.width, height: overlay.height }
    }
}

/// Axis-aligned rectangle in native page units, bottom-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

pub fn to_native(
    rect: RenderRect,
    rendered_width: f32,
    rendered_height: f32,
    native_width: f32,
    native_height: f32,
) -> NativeRect {
    let scale_x = native_width / rendered_width;
    let scale_y = native_height / rendered_height;

    NativeRect {
        x: rect.x * scale_x,
        y: native_height - (rect.y + rect.height) * scale_y,
        width: rect.width * scale_x,
        height: rect.height * scale_y,
    }
}

pub fn to_render(
    rect: NativeRect,
    rendered_width: f32,
    rendered_height: f32,
    native_width: f32,
    native_height: f32,
) -> RenderRect {
    let scale_x = rendered_width / native_width;
    let scale_y = rendered_height / native_height;
    let height = rect.height * scale_y;

    RenderRect {
        x: rect.x * scale_x,
        y: (native_height - rect.y) * scale_y - height,
        width: rect.width * scale_x,
        height,
    }
}

/// Bounding-box containment test against a pointer position expressed
/// relative to the top-left of the overlay's page surface.
pub fn hit_test(overlay: &Overlay, x: f32, y: f32) -> bool {
    x >= overlay.x
        && x <= overlay.x + overlay.width
        && y >= overlay.y
        && y <= overlay.y + overlay.height
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_model::{ImageRef, OverlayId};

    const TOLERANCE: f32 = 1e-3;

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < TOLERANCE,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn top_of_page_maps_to_bottom_anchored_native_rect() {
        let rect = RenderRect { x: 100.0, y: 0.0, width: 200.0, height: 80.0 };
        let native = to_native(rect, 800.0, 1000.0, 612.0, 792.0);

        assert_close(native.x, 76.5);
        assert_close(native.width, 153.0);
        assert_close(native.height, 63.36);
        assert_close(native.y, 792.0 - 63.36);
    }

    #[test]
    fn bottom_of_page_maps_to_native_origin() {
        let rect = RenderRect { x: 0.0, y: 920.0, width: 100.0, height: 80.0 };
        let native = to_native(rect, 800.0, 1000.0, 612.0, 792.0);

        assert_close(native.y, 0.0);
    }

    #[test]
    fn round_trip_reproduces_render_rect() {
        let rect = RenderRect { x: 137.5, y: 412.25, width: 180.0, height: 64.0 };
        let native = to_native(rect, 793.0, 1027.0, 595.0, 842.0);
        let back = to_render(native, 793.0, 1027.0, 595.0, 842.0);

        assert_close(back.x, rect.x);
        assert_close(back.y, rect.y);
        assert_close(back.width, rect.width);
        assert_close(back.height, rect.height);
    }

    #[test]
    fn identity_scale_only_flips_the_vertical_axis() {
        let rect = RenderRect { x: 10.0, y: 20.0, width: 30.0, height: 40.0 };
        let native = to_native(rect, 612.0, 792.0, 612.0, 792.0);

        assert_close(native.x, 10.0);
        assert_close(native.y, 792.0 - 60.0);
        assert_close(native.width, 30.0);
        assert_close(native.height, 40.0);
    }

    #[test]
    fn hit_test_is_inclusive_of_edges() {
        let overlay = Overlay {
            id: OverlayId(1),
            image: ImageRef::from("sig.png"),
            x: 100.0,
            y: 100.0,
            width: 200.0,
            height: 80.0,
            page: 1,
        };

        assert!(hit_test(&overlay, 100.0, 100.0));
        assert!(hit_test(&overlay, 300.0, 180.0));
        assert!(hit_test(&overlay, 200.0, 150.0));
        assert!(!hit_test(&overlay, 99.9, 100.0));
        assert!(!hit_test(&overlay, 200.0, 180.1));
    }
}
