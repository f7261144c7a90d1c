//! Blit and composite algorithms.
//!
//! Three levels, each a loop over the one below:
//! * [`blit_tile`] composites one source tile into one destination tile over
//!   their overlap, optionally through a mask layer;
//! * [`fan_out_to_tile`] blits every tile of a source layer into one target;
//! * [`paint_layer_onto_layer`] paints a whole source layer into a target
//!   layer, growing a tiled target on demand.
//!
//! Gray sources are coverage operands (stamps, selections): they paint the
//! flat `color` of the options.  RGBA sources paint their own pixels.

use std::collections::HashSet;

use image::{GrayImage, RgbaImage};
use log::trace;
use rayon::prelude::*;

use super::geom::{Point, Rect, Size};
use super::layer::{cell_origin, Layer};
use super::pixel::{blend_gray, div255, gray, BlendPrecision, PixelGrayA, PixelRgba};
use super::sync::{aborted, AbortFlag};
use super::tile::{gray_row, gray_row_mut, rgba_row, rgba_row_mut, Tile, TileBuffer, TILE_SIZE};

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderMode {
    /// Alpha composite source over destination.
    #[default]
    Blend,
    /// Overwrite destination pixels with the (format converted) source.
    /// Mask, opacity and colour are ignored.
    DirectCopy,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderOptions {
    pub mode: RenderMode,
    /// Paint colour for gray sources; its alpha scales `opacity`.
    pub color: PixelRgba,
    pub opacity: u8,
    /// Paint the complement of a gray source.
    pub invert: bool,
    pub precision: BlendPrecision,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            mode: RenderMode::Blend,
            color: PixelRgba::WHITE,
            opacity: 255,
            invert: false,
            precision: BlendPrecision::Float,
        }
    }
}

impl RenderOptions {
    pub fn with_color(self, color: PixelRgba) -> Self {
        Self { color, ..self }
    }

    pub fn with_opacity(self, opacity: u8) -> Self {
        Self { opacity, ..self }
    }

    pub fn with_precision(self, precision: BlendPrecision) -> Self {
        Self { precision, ..self }
    }

    pub fn inverted(self) -> Self {
        Self { invert: true, ..self }
    }

    pub fn direct_copy() -> Self {
        Self { mode: RenderMode::DirectCopy, ..Self::default() }
    }
}

// ============================================================================
// DESTINATION VIEW
// ============================================================================

/// Mutable view of whatever buffer is being composited into.
enum Target<'a> {
    Rgba(&'a mut RgbaImage),
    Gray(&'a mut GrayImage),
}

impl<'a> Target<'a> {
    fn of(buffer: &'a mut TileBuffer) -> Self {
        match buffer {
            TileBuffer::Rgba(img) => Target::Rgba(img),
            TileBuffer::Gray(img) => Target::Gray(img),
        }
    }

    fn size(&self) -> Size {
        match self {
            Target::Rgba(img) => Size::new(img.width(), img.height()),
            Target::Gray(img) => Size::new(img.width(), img.height()),
        }
    }
}

// ============================================================================
// SINGLE TILE BLIT
// ============================================================================

/// Composite `src` into `dst` over the overlap of their document-space
/// footprints.  Layer offsets place each tile in document space.
///
/// Disjoint footprints are a no-op.  An empty mask layer means "no mask";
/// otherwise the mask is rendered over the overlap and multiplies coverage.
/// If `abort` is raised before the pixel pass the tile is left untouched.
pub fn blit_tile(
    dst: &mut Tile,
    dst_layer_offset: Point,
    src: &Tile,
    src_layer_offset: Point,
    mask: Option<&Layer>,
    opts: &RenderOptions,
    abort: Option<&AbortFlag>,
) {
    let origin = dst_layer_offset + dst.offset;
    blit_into(&mut Target::of(&mut dst.buffer), origin, src, src_layer_offset, mask, opts, abort);
}

fn blit_into(
    target: &mut Target<'_>,
    target_origin: Point,
    src: &Tile,
    src_layer_offset: Point,
    mask: Option<&Layer>,
    opts: &RenderOptions,
    abort: Option<&AbortFlag>,
) {
    let dst_rect = Rect::from_origin_size(target_origin, target.size());
    let src_rect = src.rect().translated(src_layer_offset);
    let area = dst_rect.intersect(&src_rect);
    if area.is_empty() {
        return;
    }

    let coverage = match mask {
        Some(m) if !m.is_empty() && opts.mode == RenderMode::Blend => {
            Some(render_layer_gray(m, area, None, &RenderOptions::default(), abort))
        }
        _ => None,
    };
    if aborted(abort) {
        return;
    }

    let rows = Rows {
        area,
        dst_origin: target_origin,
        src_origin: src_rect.origin(),
    };
    match opts.mode {
        RenderMode::Blend => blend_rows(target, &src.buffer, &rows, coverage.as_ref(), opts),
        RenderMode::DirectCopy => copy_rows(target, &src.buffer, &rows),
    }
}

/// Geometry of one blit: the overlap plus the two buffer origins.
struct Rows {
    area: Rect,
    dst_origin: Point,
    src_origin: Point,
}

impl Rows {
    fn width(&self) -> usize {
        self.area.width as usize
    }

    fn dst_x(&self) -> usize {
        (self.area.x - self.dst_origin.x) as usize
    }

    fn src_x(&self) -> usize {
        (self.area.x - self.src_origin.x) as usize
    }

    /// `(dst row, src row, mask row)` for every scanline of the overlap.
    fn iter(&self) -> impl Iterator<Item = (u32, u32, u32)> + '_ {
        (self.area.y..self.area.bottom()).map(move |y| {
            (
                (y - self.dst_origin.y) as u32,
                (y - self.src_origin.y) as u32,
                (y - self.area.y) as u32,
            )
        })
    }
}

fn coverage_row<'a>(mask: Option<&'a GrayImage>, full: &'a [u8], row: u32) -> &'a [u8] {
    match mask {
        Some(img) => gray_row(img, row),
        None => full,
    }
}

/// `a * b * c / 255²`, all operands 0..=255.
#[inline(always)]
fn scale3(a: u32, b: u32, c: u32) -> u8 {
    (a * b * c / 65025) as u8
}

fn blend_rows(
    target: &mut Target<'_>,
    src: &TileBuffer,
    rows: &Rows,
    mask: Option<&GrayImage>,
    opts: &RenderOptions,
) {
    let w = rows.width();
    let (dx, sx) = (rows.dst_x(), rows.src_x());

    // Unmasked coverage, kept off the heap for anything tile sized.
    let full_stack = [255u8; TILE_SIZE as usize];
    let full_heap: Vec<u8>;
    let full: &[u8] = if w <= full_stack.len() {
        &full_stack[..w]
    } else {
        full_heap = vec![255; w];
        &full_heap
    };

    let invert = if opts.invert { 0xff } else { 0 };
    let strength = div255(opts.opacity as i32 * opts.color.a as i32) as u32;
    let opacity = opts.opacity as u32;
    let color = opts.color;
    let color_luma = color.luma();
    let blend = |base, over| opts.precision.blend(base, over);

    match (target, src) {
        (Target::Rgba(dst), TileBuffer::Gray(src)) => {
            for (dy, sy, my) in rows.iter() {
                let m = &coverage_row(mask, full, my)[..w];
                let s = &gray_row(src, sy)[sx..sx + w];
                let d = &mut rgba_row_mut(dst, dy)[dx..dx + w];
                for ((d, &s), &m) in d.iter_mut().zip(s).zip(m) {
                    let a = scale3(strength, (s ^ invert) as u32, m as u32);
                    if a != 0 {
                        *d = blend(*d, color.with_alpha(a));
                    }
                }
            }
        }
        (Target::Gray(dst), TileBuffer::Gray(src)) => {
            for (dy, sy, my) in rows.iter() {
                let m = &coverage_row(mask, full, my)[..w];
                let s = &gray_row(src, sy)[sx..sx + w];
                let d = &mut gray_row_mut(dst, dy)[dx..dx + w];
                for ((d, &s), &m) in d.iter_mut().zip(s).zip(m) {
                    let a = scale3(strength, (s ^ invert) as u32, m as u32);
                    if a != 0 {
                        *d = blend_gray(PixelGrayA::opaque(*d), PixelGrayA::new(color_luma, a)).l;
                    }
                }
            }
        }
        (Target::Rgba(dst), TileBuffer::Rgba(src)) => {
            for (dy, sy, my) in rows.iter() {
                let m = &coverage_row(mask, full, my)[..w];
                let s = &rgba_row(src, sy)[sx..sx + w];
                let d = &mut rgba_row_mut(dst, dy)[dx..dx + w];
                for ((d, &s), &m) in d.iter_mut().zip(s).zip(m) {
                    let a = scale3(s.a as u32, m as u32, opacity);
                    if a != 0 {
                        *d = blend(*d, s.with_alpha(a));
                    }
                }
            }
        }
        (Target::Gray(dst), TileBuffer::Rgba(src)) => {
            for (dy, sy, my) in rows.iter() {
                let m = &coverage_row(mask, full, my)[..w];
                let s = &rgba_row(src, sy)[sx..sx + w];
                let d = &mut gray_row_mut(dst, dy)[dx..dx + w];
                for ((d, &s), &m) in d.iter_mut().zip(s).zip(m) {
                    let a = scale3(s.a as u32, m as u32, opacity);
                    if a != 0 {
                        *d = blend_gray(PixelGrayA::opaque(*d), PixelGrayA::new(s.luma(), a)).l;
                    }
                }
            }
        }
    }
}

fn copy_rows(target: &mut Target<'_>, src: &TileBuffer, rows: &Rows) {
    let w = rows.width();
    let (dx, sx) = (rows.dst_x(), rows.src_x());

    match (target, src) {
        (Target::Rgba(dst), TileBuffer::Rgba(src)) => {
            for (dy, sy, _) in rows.iter() {
                rgba_row_mut(dst, dy)[dx..dx + w].copy_from_slice(&rgba_row(src, sy)[sx..sx + w]);
            }
        }
        (Target::Gray(dst), TileBuffer::Gray(src)) => {
            for (dy, sy, _) in rows.iter() {
                gray_row_mut(dst, dy)[dx..dx + w].copy_from_slice(&gray_row(src, sy)[sx..sx + w]);
            }
        }
        (Target::Rgba(dst), TileBuffer::Gray(src)) => {
            for (dy, sy, _) in rows.iter() {
                let s = &gray_row(src, sy)[sx..sx + w];
                for (d, &s) in rgba_row_mut(dst, dy)[dx..dx + w].iter_mut().zip(s) {
                    *d = PixelRgba::opaque(s, s, s);
                }
            }
        }
        (Target::Gray(dst), TileBuffer::Rgba(src)) => {
            for (dy, sy, _) in rows.iter() {
                let s = &rgba_row(src, sy)[sx..sx + w];
                for (d, s) in gray_row_mut(dst, dy)[dx..dx + w].iter_mut().zip(s) {
                    *d = div255(gray(s.r, s.g, s.b) as i32 * s.a as i32) as u8;
                }
            }
        }
    }
}

// ============================================================================
// LAYER FAN-OUT
// ============================================================================

/// Blit every tile of `source` into `target`, stopping between tiles once
/// `abort` is raised.
pub fn fan_out_to_tile(
    target: &mut Tile,
    target_layer_offset: Point,
    source: &Layer,
    mask: Option<&Layer>,
    opts: &RenderOptions,
    abort: Option<&AbortFlag>,
) {
    let origin = target_layer_offset + target.offset;
    fan_out_into(&mut Target::of(&mut target.buffer), origin, source, mask, opts, abort);
}

fn fan_out_into(
    target: &mut Target<'_>,
    target_origin: Point,
    source: &Layer,
    mask: Option<&Layer>,
    opts: &RenderOptions,
    abort: Option<&AbortFlag>,
) {
    let mask = mask.filter(|m| !m.is_empty());
    for tile in source.tiles() {
        if aborted(abort) {
            return;
        }
        blit_into(target, target_origin, tile, source.offset, mask, opts, abort);
    }
}

/// Like [`fan_out_to_tile`], for a plain RGBA buffer whose top-left pixel
/// sits at `origin` in document space.
pub fn fan_out_to_rgba(
    target: &mut RgbaImage,
    origin: Point,
    source: &Layer,
    mask: Option<&Layer>,
    opts: &RenderOptions,
    abort: Option<&AbortFlag>,
) {
    fan_out_into(&mut Target::Rgba(target), origin, source, mask, opts, abort);
}

/// Flatten `source` over `rect` into a fresh transparent RGBA buffer.
pub fn render_layer_rgba(
    source: &Layer,
    rect: Rect,
    mask: Option<&Layer>,
    opts: &RenderOptions,
    abort: Option<&AbortFlag>,
) -> RgbaImage {
    let size = rect.size();
    let mut img = RgbaImage::new(size.width, size.height);
    if !size.is_empty() {
        fan_out_to_rgba(&mut img, rect.origin(), source, mask, opts, abort);
    }
    img
}

/// Flatten `source` over `rect` into a fresh zeroed intensity buffer.
pub fn render_layer_gray(
    source: &Layer,
    rect: Rect,
    mask: Option<&Layer>,
    opts: &RenderOptions,
    abort: Option<&AbortFlag>,
) -> GrayImage {
    let size = rect.size();
    let mut img = GrayImage::new(size.width, size.height);
    if !size.is_empty() {
        fan_out_into(&mut Target::Gray(&mut img), rect.origin(), source, mask, opts, abort);
    }
    img
}

// ============================================================================
// LAYER ONTO LAYER
// ============================================================================

/// Paint `source` into `target`.
///
/// A tiled target grows a background tile for every grid cell the source
/// footprint touches, then the touched tiles are composited in parallel.
/// A non-tiled target receives the blit in its single tile; when it has no
/// tile yet it adopts a private copy of the first source tile.
pub fn paint_layer_onto_layer(
    target: &mut Layer,
    source: &Layer,
    mask: Option<&Layer>,
    opts: &RenderOptions,
    abort: Option<&AbortFlag>,
) {
    if source.is_empty() || aborted(abort) {
        return;
    }

    if !target.is_tiled() {
        paint_onto_single(target, source, mask, opts, abort);
        return;
    }

    let rebase = source.offset - target.offset;
    let mut touched: HashSet<Point> = HashSet::new();
    for tile in source.tiles() {
        let footprint = tile.rect().translated(rebase);
        if footprint.is_empty() {
            continue;
        }
        let first = cell_origin(footprint.origin());
        let last = cell_origin(Point::new(footprint.right() - 1, footprint.bottom() - 1));
        for cy in (first.y..=last.y).step_by(TILE_SIZE as usize) {
            for cx in (first.x..=last.x).step_by(TILE_SIZE as usize) {
                if touched.insert(Point::new(cx, cy)) {
                    let (_, created) = target.tile_or_insert(cx, cy);
                    if created {
                        trace!("created tile at ({cx}, {cy})");
                    }
                }
            }
        }
    }

    let target_offset = target.offset;
    target
        .tiles_mut()
        .par_iter_mut()
        .filter(|handle| touched.contains(&handle.offset))
        .for_each(|handle| {
            if aborted(abort) {
                return;
            }
            fan_out_to_tile(handle.make_mut(), target_offset, source, mask, opts, abort);
        });
}

fn paint_onto_single(
    target: &mut Layer,
    source: &Layer,
    mask: Option<&Layer>,
    opts: &RenderOptions,
    abort: Option<&AbortFlag>,
) {
    let target_offset = target.offset;
    let mut rest = source.tiles();

    if target.is_empty() {
        let Some((first, tail)) = source.tiles().split_first() else {
            return;
        };
        let adopted: Tile = (**first).clone();
        let offset = adopted.offset + source.offset - target_offset;
        target.set_single_image(offset, adopted.buffer);
        rest = tail;
    }

    if let Some(handle) = target.tiles_mut().first_mut() {
        let tile = handle.make_mut();
        let origin = target_offset + tile.offset;
        let mut view = Target::of(&mut tile.buffer);
        for src in rest {
            if aborted(abort) {
                return;
            }
            blit_into(&mut view, origin, src, source.offset, mask, opts, abort);
        }
    }
}
