// ============================================================================
// RESIZE: area-averaged reduction, bicubic enlargement
// ============================================================================

use image::imageops::{self, FilterType};
use image::RgbaImage;
use log::info;

use super::filters::{from_premultiplied, to_premultiplied};
use crate::canvas::{AbortFlag, Document};

/// Largest accepted edge length for a resized image.
pub const MAX_DIMENSION: u32 = 1 << 16;

/// Scale `img` to `width × height` (each clamped to `1..=MAX_DIMENSION`).
///
/// Axes that shrink are reduced first with an area-weighted triangle filter,
/// then axes that grow are enlarged with the Catmull-Rom cubic (a = -0.5).
/// Both passes run on premultiplied colour.
pub fn resize(img: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let w = width.clamp(1, MAX_DIMENSION);
    let h = height.clamp(1, MAX_DIMENSION);
    let (sw, sh) = img.dimensions();
    if (sw, sh) == (w, h) {
        return img.clone();
    }
    if sw == 0 || sh == 0 {
        return RgbaImage::new(w, h);
    }

    let mut work = to_premultiplied(img);
    if w < sw || h < sh {
        work = imageops::resize(&work, w.min(sw), h.min(sh), FilterType::Triangle);
    }
    if w > work.width() || h > work.height() {
        work = imageops::resize(&work, w, h, FilterType::CatmullRom);
    }
    from_premultiplied(&work)
}

/// Render the document, scale it and make the result the new image.  The
/// selection is dropped.  Returns `false` (document untouched) on abort.
pub fn resize_document(doc: &mut Document, width: u32, height: u32, abort: Option<&AbortFlag>) -> bool {
    let Some(flat) = doc.render_to_layer(doc.bounds(), false, abort) else {
        return false;
    };
    let (sw, sh) = flat.dimensions();
    let scaled = resize(&flat, width, height);
    info!("resized {sw}x{sh} -> {}x{}", scaled.width(), scaled.height());
    doc.set_image(scaled);
    true
}
