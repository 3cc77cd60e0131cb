use serde::{Deserialize, Serialize};

/// Height, in render-space pixels, given to a freshly placed overlay.
pub const INITIAL_OVERLAY_HEIGHT: f32 = 100.0;

/// Render-space offset from the page's top-left corner at which a freshly
/// placed overlay lands.
pub const INITIAL_OVERLAY_POSITION: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OverlayId(pub u64);

/// Opaque reference to a signature image. The placement engine never looks
/// inside it; compositing hands it to an image resolver to obtain bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ImageRef {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ImageRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A placed signature instance. `x,y` is the top-left corner in render-space
/// pixels relative to the top-left of the page surface identified by `page`;
/// `width,height` are render-space pixel dimensions. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub id: OverlayId,
    pub image: ImageRef,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub page: u32,
}

impl Overlay {
    pub fn aspect_ratio(&self) -> f32 {
        self.width / self.height
    }
}

/// A captured signature image kept for reuse. The serialized layout is the
/// externally visible history format, hence the camelCase field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRecord {
    pub id: String,
    pub data_url: String,
    pub timestamp: u64,
}

/// Ordered collection of placed overlays. Creation order is stacking order:
/// later overlays draw on top of earlier ones on the same page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayStore {
    overlays: Vec<Overlay>,
    next_overlay_id: u64,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places a new overlay on page 1 at the default position. The overlay's
    /// aspect ratio is fixed here, derived from the source image's intrinsic
    /// dimensions, and preserved by every later resize.
    pub fn place(
        &mut self,
        image: ImageRef,
        intrinsic_width: f32,
        intrinsic_height: f32,
    ) -> OverlayId {
        let aspect_ratio = if intrinsic_width > 0.0 && intrinsic_height > 0.0 {
            intrinsic_width / intrinsic_height
        } else {
            1.0
        };

        self.next_overlay_id += 1;
        let id = OverlayId(self.next_overlay_id);

        self.overlays.push(Overlay {
            id,
            image,
            x: INITIAL_OVERLAY_POSITION,
            y: INITIAL_OVERLAY_POSITION,
            width: INITIAL_OVERLAY_HEIGHT * aspect_ratio,
            height: INITIAL_OVERLAY_HEIGHT,
            page: 1,
        });

        id
    }

    pub fn get(&self, id: OverlayId) -> Option<&Overlay> {
        self.overlays.iter().find(|overlay| overlay.id == id)
    }

    /// Overlays in creation order.
    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    /// Moves an overlay to a (possibly different) page. Unknown ids are a
    /// no-op; a drag can outlive the overlay it started on.
    pub fn move_to(&mut self, id: OverlayId, page: u32, x: f32, y: f32) {
        if let Some(overlay) = self.overlays.iter_mut().find(|overlay| overlay.id == id) {
            overlay.page = page;
            overlay.x = x;
            overlay.y = y;
        }
    }

    /// Sets an overlay's dimensions. Non-positive dimensions and unknown ids
    /// are ignored.
    pub fn resize(&mut self, id: OverlayId, width: f32, height: f32) {
        if width <= 0.0 || height <= 0.0 {
            return;
        }

        if let Some(overlay) = self.overlays.iter_mut().find(|overlay| overlay.id == id) {
            overlay.width = width;
            overlay.height = height;
        }
    }

    pub fn remove(&mut self, id: OverlayId) -> bool {
        let Some(index) = self.overlays.iter().position(|overlay| overlay.id == id) else {
            return false;
        };

        self.overlays.remove(index);
        true
    }

    pub fn clear(&mut self) {
        self.overlays.clear();
    }

    /// Rescales position and size of every overlay on `page` by the given
    /// factors. Called when the page's rendered geometry changes so overlays
    /// stay anchored to the same document location.
    pub fn rescale_page(&mut self, page: u32, scale_x: f32, scale_y: f32) {
        if scale_x <= 0.0 || scale_y <= 0.0 {
            return;
        }

        for overlay in self.overlays.iter_mut().filter(|overlay| overlay.page == page) {
            overlay.x *= scale_x;
            overlay.y *= scale_y;
            overlay.width *= scale_x;
            overlay.height *= scale_y;
        }
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }
}
