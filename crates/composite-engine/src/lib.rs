//! Bakes placed signature overlays into a document's native byte form.
//!
//! Overlay positions arrive in render-space pixels relative to the top-left
//! of each rendered page surface; PDF user space puts the origin at the
//! bottom-left of the page. `bake` resolves each overlay's scale factors
//! from the geometry snapshot, flips the vertical axis, and appends the
//! signature image to the target page as an image XObject. The input buffer
//! is never mutated; on any failure no output is produced.

use image::DynamicImage;
use log::debug;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use overlay_model::{ImageRef, Overlay};
use placement_core::mapper::{self, NativeRect, RenderRect};
use placement_core::{NativeSize, PageGeometryRegistry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Bound on the page-tree parent walk when MediaBox is inherited. Malformed
/// documents can contain parent cycles.
const MEDIA_BOX_PARENT_DEPTH: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("failed to resolve image {reference}: {source}")]
    ImageSource { reference: String, source: std::io::Error },
    #[error("failed to decode image {reference}: {source}")]
    ImageDecode { reference: String, source: image::ImageError },
    #[error("a bake is already in flight for this session")]
    BakeInFlight,
    #[error("bake deadline exceeded")]
    Timeout,
}

/// Seam through which `bake` obtains the encoded bytes behind an overlay's
/// image reference. Hosts back this with whatever their references point at:
/// files, data URLs, in-memory captures.
pub trait ImageResolver {
    fn resolve(&self, image: &ImageRef) -> std::io::Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BakeOptions {
    /// Deadline for the whole bake, checked between per-overlay steps.
    pub timeout: Option<Duration>,
}

/// Admits at most one in-flight bake per document session. Two interleaved
/// bakes would produce divergent output buffers, so the second request is
/// rejected rather than queued.
#[derive(Debug, Clone, Default)]
pub struct BakeGate {
    in_flight: Arc<AtomicBool>,
}

impl BakeGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Result<BakeTicket, CompositeError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(CompositeError::BakeInFlight);
        }

        Ok(BakeTicket { in_flight: Arc::clone(&self.in_flight) })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Held for the duration of a bake; dropping it re-opens the gate, also when
/// the bake failed or its session ended early.
#[derive(Debug)]
pub struct BakeTicket {
    in_flight: Arc<AtomicBool>,
}

impl Drop for BakeTicket {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

/// Composites `overlays` into `base_pdf` and returns the new document bytes.
///
/// Overlays are applied in creation order, so later overlays draw on top of
/// earlier ones on the same page. `overlays` and `geometry` are snapshots
/// taken at call time; UI mutation during an in-flight bake cannot leak in.
/// A page with no registered rendered geometry falls back to a 1:1 scale
/// (rendered == native).
pub fn bake(
    base_pdf: &[u8],
    overlays: &[Overlay],
    geometry: &PageGeometryRegistry,
    resolver: &dyn ImageResolver,
    options: &BakeOptions,
) -> Result<Vec<u8>, CompositeError> {
    let deadline = options.timeout.map(|limit| Instant::now() + limit);

    let mut doc = Document::load_mem(base_pdf)?;
    let pages = doc.get_pages();
    let page_count = pages.len() as u32;

    for (index, overlay) in overlays.iter().enumerate() {
        check_deadline(deadline)?;

        let page_id = *pages.get(&overlay.page).ok_or(CompositeError::PageOutOfRange {
            page: overlay.page,
            page_count,
        })?;

        let media_box = media_box_for_page(&doc, page_id)?;
        let native_width = media_box[2] - media_box[0];
        let native_height = media_box[3] - media_box[1];

        let (rendered_width, rendered_height) = match geometry.get(overlay.page) {
            Some(geometry) => (geometry.surface.width, geometry.surface.height),
            None => {
                debug!(
                    "no rendered geometry registered for page {}, assuming 1:1 scale",
                    overlay.page
                );
                (native_width, native_height)
            }
        };

        let rect = mapper::to_native(
            RenderRect::from(overlay),
            rendered_width,
            rendered_height,
            native_width,
            native_height,
        );

        let bytes = resolver.resolve(&overlay.image).map_err(|source| {
            CompositeError::ImageSource { reference: overlay.image.as_str().to_owned(), source }
        })?;

        check_deadline(deadline)?;

        let decoded = image::load_from_memory(&bytes).map_err(|source| {
            CompositeError::ImageDecode { reference: overlay.image.as_str().to_owned(), source }
        })?;

        let name = format!("Sig{index}");
        let xobject_id = embed_image(&mut doc, &decoded);
        add_image_resource(&mut doc, page_id, &name, xobject_id)?;
        append_draw_content(&mut doc, page_id, &name, rect)?;
    }

    check_deadline(deadline)?;

    let mut output = Vec::new();
    doc.save_to(&mut output)?;

    Ok(output)
}

/// Native page sizes of a document, in page order.
pub fn page_sizes(base_pdf: &[u8]) -> Result<Vec<NativeSize>, CompositeError> {
    let doc = Document::load_mem(base_pdf)?;
    let mut sizes = Vec::new();

    for (_, page_id) in doc.get_pages() {
        let media_box = media_box_for_page(&doc, page_id)?;
        sizes.push(NativeSize {
            width: media_box[2] - media_box[0],
            height: media_box[3] - media_box[1],
        });
    }

    Ok(sizes)
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), CompositeError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(CompositeError::Timeout),
        _ => Ok(()),
    }
}

/// MediaBox of a page, following inheritance up the page tree. Handles both
/// inline and referenced arrays; falls back to US Letter when absent.
fn media_box_for_page(doc: &Document, page_id: ObjectId) -> Result<[f32; 4], CompositeError> {
    let page = doc.get_object(page_id)?;
    Ok(media_box_recursive(doc, page, MEDIA_BOX_PARENT_DEPTH))
}

fn media_box_recursive(doc: &Document, object: &Object, depth: usize) -> [f32; 4] {
    if depth == 0 {
        return DEFAULT_MEDIA_BOX;
    }

    let Object::Dictionary(dict) = object else {
        return DEFAULT_MEDIA_BOX;
    };

    if let Ok(media_box) = dict.get(b"MediaBox") {
        let array = match media_box {
            Object::Array(array) => Some(array),
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(Object::Array(array)) => Some(array),
                _ => None,
            },
            _ => None,
        };

        if let Some(array) = array {
            if array.len() == 4 {
                let values: Vec<f32> =
                    array.iter().filter_map(|value| value.as_float().ok()).collect();
                if values.len() == 4 {
                    return [values[0], values[1], values[2], values[3]];
                }
            }
        }
    }

    if let Ok(Object::Reference(parent_id)) = dict.get(b"Parent") {
        if let Ok(parent) = doc.get_object(*parent_id) {
            return media_box_recursive(doc, parent, depth - 1);
        }
    }

    DEFAULT_MEDIA_BOX
}

/// Registers the decoded image as an RGB XObject with its alpha channel
/// split into an SMask, and returns the XObject's id.
fn embed_image(doc: &mut Document, image: &DynamicImage) -> ObjectId {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }

    let smask_id = doc.add_object(Stream::new(
        Dictionary::from_iter([
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(i64::from(width))),
            ("Height", Object::Integer(i64::from(height))),
            ("ColorSpace", Object::Name(b"DeviceGray".to_vec())),
            ("BitsPerComponent", Object::Integer(8)),
        ]),
        alpha,
    ));

    doc.add_object(Stream::new(
        Dictionary::from_iter([
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(i64::from(width))),
            ("Height", Object::Integer(i64::from(height))),
            ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
            ("BitsPerComponent", Object::Integer(8)),
            ("SMask", Object::Reference(smask_id)),
        ]),
        rgb,
    ))
}

/// Adds the XObject under `name` to the page's resources. Resources and the
/// nested XObject dictionary may each be inline, referenced, or missing.
fn add_image_resource(
    doc: &mut Document,
    page_id: ObjectId,
    name: &str,
    xobject_id: ObjectId,
) -> Result<(), CompositeError> {
    let resources_ref = {
        let page = doc.get_dictionary(page_id)?;
        match page.get(b"Resources") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        }
    };

    if let Some(resources_id) = resources_ref {
        let xobjects_ref = {
            let resources = doc.get_dictionary(resources_id)?;
            match resources.get(b"XObject") {
                Ok(Object::Reference(id)) => Some(*id),
                _ => None,
            }
        };

        if let Some(xobjects_id) = xobjects_ref {
            if let Object::Dictionary(xobjects) = doc.get_object_mut(xobjects_id)? {
                xobjects.set(name, Object::Reference(xobject_id));
            }
        } else if let Object::Dictionary(resources) = doc.get_object_mut(resources_id)? {
            set_xobject_entry(resources, name, xobject_id);
        }

        return Ok(());
    }

    if let Object::Dictionary(page) = doc.get_object_mut(page_id)? {
        let mut resources = match page.get(b"Resources") {
            Ok(Object::Dictionary(existing)) => existing.clone(),
            _ => Dictionary::new(),
        };
        set_xobject_entry(&mut resources, name, xobject_id);
        page.set("Resources", Object::Dictionary(resources));
    }

    Ok(())
}

fn set_xobject_entry(resources: &mut Dictionary, name: &str, xobject_id: ObjectId) {
    let mut xobjects = match resources.get(b"XObject") {
        Ok(Object::Dictionary(existing)) => existing.clone(),
        _ => Dictionary::new(),
    };
    xobjects.set(name, Object::Reference(xobject_id));
    resources.set("XObject", Object::Dictionary(xobjects));
}

/// Appends a content stream drawing the named XObject at the native-space
/// rectangle, preserving whatever content the page already has.
fn append_draw_content(
    doc: &mut Document,
    page_id: ObjectId,
    name: &str,
    rect: NativeRect,
) -> Result<(), CompositeError> {
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(rect.width),
                    Object::Real(0.0),
                    Object::Real(0.0),
                    Object::Real(rect.height),
                    Object::Real(rect.x),
                    Object::Real(rect.y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };

    let encoded = content.encode()?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

    if let Object::Dictionary(page) = doc.get_object_mut(page_id)? {
        match page.get(b"Contents").ok().cloned() {
            Some(Object::Reference(existing)) => {
                page.set(
                    "Contents",
                    Object::Array(vec![
                        Object::Reference(existing),
                        Object::Reference(content_id),
                    ]),
                );
            }
            Some(Object::Array(mut contents)) => {
                contents.push(Object::Reference(content_id));
                page.set("Contents", Object::Array(contents));
            }
            _ => page.set("Contents", Object::Reference(content_id)),
        }
    }

    Ok(())
}
