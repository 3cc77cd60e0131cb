//! Pointer-driven drag and resize state machine over placed overlays.
//!
//! Mouse and touch input are unified into [`PointerEvent`] before they reach
//! the controller, so the state machine has a single event vocabulary. All
//! coordinates are viewport coordinates; the controller translates them to
//! page-surface-relative positions through the geometry registry.

use crate::{mapper, PageGeometryRegistry};
use overlay_model::{OverlayId, OverlayStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Smallest width a resize drag can reach, in render pixels.
pub const MIN_RESIZE_WIDTH: f32 = 50.0;

/// Pointer travel below this distance counts as a click rather than a drag.
pub const CLICK_DRAG_THRESHOLD: f32 = 4.0;

/// Side length of the square resize hit zone centered on the selected
/// overlay's bottom-right corner.
pub const RESIZE_HANDLE_SIZE: f32 = 12.0;

/// A unified pointer event in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Dragging {
        overlay: OverlayId,
        offset_x: f32,
        offset_y: f32,
    },
    Resizing {
        overlay: OverlayId,
        anchor_width: f32,
        anchor_height: f32,
        anchor_pointer_x: f32,
    },
}

/// Observable side of the pointer-capture pair. The hosting view keeps a
/// clone and attaches window-level move/up listeners exactly while
/// `is_active()` holds.
#[derive(Debug, Clone, Default)]
pub struct CaptureState {
    active: Arc<AtomicBool>,
}

impl CaptureState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Guard for the window-level listener registration. Acquired on entering a
/// non-idle state; dropping it releases the capture no matter how the
/// interaction ended, including the controller being torn down mid-drag.
#[derive(Debug)]
struct PointerCapture {
    state: CaptureState,
}

impl PointerCapture {
    fn acquire(state: &CaptureState) -> Self {
        state.active.store(true, Ordering::Release);
        Self { state: state.clone() }
    }
}

impl Drop for PointerCapture {
    fn drop(&mut self) {
        self.state.active.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
pub struct InteractionController {
    state: InteractionState,
    selected: Option<OverlayId>,
    capture_state: CaptureState,
    capture: Option<PointerCapture>,
    down_position: Option<(f32, f32)>,
    dragged: bool,
    pressed_empty: bool,
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    /// Selection is orthogonal to the interaction state and persists across
    /// drags and resizes until explicitly cleared.
    pub fn selected(&self) -> Option<OverlayId> {
        self.selected
    }

    pub fn select(&mut self, id: OverlayId) {
        self.selected = Some(id);
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Handle for the host to observe pointer-capture lifetime.
    pub fn capture_state(&self) -> CaptureState {
        self.capture_state.clone()
    }

    pub fn handle_event(
        &mut self,
        store: &mut OverlayStore,
        registry: &PageGeometryRegistry,
        event: PointerEvent,
    ) {
        match event {
            PointerEvent::Down { x, y } => self.pointer_down(store, registry, x, y),
            PointerEvent::Move { x, y } => self.pointer_move(store, registry, x, y),
            PointerEvent::Up => self.pointer_up(),
        }
    }

    /// Removes the selected overlay and clears the selection. Returns whether
    /// an overlay was actually removed.
    pub fn delete_selected(&mut self, store: &mut OverlayStore) -> bool {
        let Some(id) = self.selected.take() else {
            return false;
        };

        store.remove(id)
    }

    fn pointer_down(
        &mut self,
        store: &mut OverlayStore,
        registry: &PageGeometryRegistry,
        x: f32,
        y: f32,
    ) {
        self.down_position = Some((x, y));
        self.dragged = false;
        self.pressed_empty = false;

        // The resize handle overlaps the overlay body at its corner, so it
        // wins the hit test while its overlay is selected.
        if let Some((overlay, width, height)) = self.resize_handle_hit(store, registry, x, y) {
            self.state = InteractionState::Resizing {
                overlay,
                anchor_width: width,
                anchor_height: height,
                anchor_pointer_x: x,
            };
            self.capture = Some(PointerCapture::acquire(&self.capture_state));
            return;
        }

        if let Some(geometry) = registry.surface_at(x, y) {
            let page_x = x - geometry.surface.left;
            let page_y = y - geometry.surface.top;

            // Topmost hit wins: later overlays stack above earlier ones.
            let hit = store
                .overlays()
                .iter()
                .rev()
                .find(|overlay| {
                    overlay.page == geometry.page && mapper::hit_test(overlay, page_x, page_y)
                })
                .map(|overlay| (overlay.id, page_x - overlay.x, page_y - overlay.y));

            if let Some((overlay, offset_x, offset_y)) = hit {
                self.selected = Some(overlay);
                self.state = InteractionState::Dragging { overlay, offset_x, offset_y };
                self.capture = Some(PointerCapture::acquire(&self.capture_state));
                return;
            }
        }

        self.pressed_empty = true;
    }

    fn pointer_move(
        &mut self,
        store: &mut OverlayStore,
        registry: &PageGeometryRegistry,
        x: f32,
        y: f32,
    ) {
        if let Some((down_x, down_y)) = self.down_position {
            let distance_squared = (x - down_x).powi(2) + (y - down_y).powi(2);
            if distance_squared > CLICK_DRAG_THRESHOLD * CLICK_DRAG_THRESHOLD {
                self.dragged = true;
            }
        }

        match self.state {
            InteractionState::Dragging { overlay, offset_x, offset_y } => {
                // Pointer outside every page keeps the last valid placement.
                if let Some(geometry) = registry.surface_at(x, y) {
                    store.move_to(
                        overlay,
                        geometry.page,
                        x - geometry.surface.left - offset_x,
                        y - geometry.surface.top - offset_y,
                    );
                }
            }
            InteractionState::Resizing {
                overlay,
                anchor_width,
                anchor_height,
                anchor_pointer_x,
            } => {
                let delta_x = x - anchor_pointer_x;
                let width = (anchor_width + delta_x).max(MIN_RESIZE_WIDTH);
                let height = width / (anchor_width / anchor_height);
                store.resize(overlay, width, height);
            }
            InteractionState::Idle => {}
        }
    }

    fn pointer_up(&mut self) {
        if self.pressed_empty && !self.dragged {
            self.selected = None;
        }

        self.state = InteractionState::Idle;
        self.capture = None;
        self.down_position = None;
        self.dragged = false;
        self.pressed_empty = false;
    }

    fn resize_handle_hit(
        &self,
        store: &OverlayStore,
        registry: &PageGeometryRegistry,
        x: f32,
        y: f32,
    ) -> Option<(OverlayId, f32, f32)> {
        let selected = self.selected?;
        let overlay = store.get(selected)?;
        let geometry = registry.get(overlay.page)?;

        let page_x = x - geometry.surface.left;
        let page_y = y - geometry.surface.top;
        let half = RESIZE_HANDLE_SIZE / 2.0;
        let corner_x = overlay.x + overlay.width;
        let corner_y = overlay.y + overlay.height;

        let on_handle = (page_x - corner_x).abs() <= half && (page_y - corner_y).abs() <= half;
        on_handle.then_some((selected, overlay.width, overlay.height))
    }
}
