// ============================================================================
// IMAGE FILTERS: disc-shaped rank filters (median / maximize / minimize), blur
// ============================================================================
//
// Filters run on a flattened render of the document and the result replaces
// the image, the same way a freshly loaded picture does.

use std::str::FromStr;

use image::{imageops, ImageBuffer, Rgba, RgbaImage};
use log::info;
use rayon::prelude::*;

use crate::canvas::pixel::PixelRgba;
use crate::canvas::tile::rgba_row;
use crate::canvas::{AbortFlag, Document};

/// Radius used when none is given.
pub const DEFAULT_RADIUS: u32 = 10;
/// Largest accepted filter radius.
pub const MAX_RADIUS: u32 = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    Median,
    Maximize,
    Minimize,
    Blur,
}

impl FromStr for FilterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "median" => Ok(FilterKind::Median),
            "maximize" | "max" => Ok(FilterKind::Maximize),
            "minimize" | "min" => Ok(FilterKind::Minimize),
            "blur" => Ok(FilterKind::Blur),
            other => Err(format!("unknown filter '{other}' (median, maximize, minimize, blur)")),
        }
    }
}

/// Apply `kind` with the given radius (clamped to `MAX_RADIUS`).
pub fn apply(img: &RgbaImage, kind: FilterKind, radius: u32) -> RgbaImage {
    let radius = radius.min(MAX_RADIUS);
    match kind {
        FilterKind::Median => rank_filter(img, radius, Rank::Median),
        FilterKind::Maximize => rank_filter(img, radius, Rank::Max),
        FilterKind::Minimize => rank_filter(img, radius, Rank::Min),
        FilterKind::Blur => blur(img, radius),
    }
}

/// Render the whole document, filter it, and make the result the new image.
/// The selection is dropped.  Returns `false` (document untouched) on abort.
pub fn filter_document(
    doc: &mut Document,
    kind: FilterKind,
    radius: u32,
    abort: Option<&AbortFlag>,
) -> bool {
    let Some(flat) = doc.render_to_layer(doc.bounds(), false, abort) else {
        return false;
    };
    let filtered = apply(&flat, kind, radius);
    doc.set_image(filtered);
    info!("{kind:?} filter applied, radius {radius}");
    true
}

// ============================================================================
// RANK FILTERS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Rank {
    Median,
    Max,
    Min,
}

/// Half-width of each row of a disc of `radius`, top to bottom
/// (`2 * radius + 1` entries).
pub fn disc_shape(radius: u32) -> Vec<u32> {
    let r = radius as usize;
    let mut shape = vec![0; r * 2 + 1];
    let rf = radius as f64;
    for y in 0..r {
        let t = ((rf - (y as f64 + 0.5)) / rf).asin();
        let x = (t.cos() * rf + 0.5).floor() as u32;
        shape[y] = x;
        shape[r * 2 - y] = x;
    }
    shape[r] = radius;
    shape
}

/// Value histogram with a 16-bucket summary for quick scans.
#[derive(Clone)]
struct Histogram {
    fine: [u32; 256],
    coarse: [u32; 16],
    count: u32,
}

impl Default for Histogram {
    fn default() -> Self {
        Self { fine: [0; 256], coarse: [0; 16], count: 0 }
    }
}

impl Histogram {
    fn insert(&mut self, v: u8) {
        self.fine[v as usize] += 1;
        self.coarse[(v >> 4) as usize] += 1;
        self.count += 1;
    }

    fn remove(&mut self, v: u8) {
        self.fine[v as usize] -= 1;
        self.coarse[(v >> 4) as usize] -= 1;
        self.count -= 1;
    }

    /// The `n`-th smallest value (0 based).
    fn nth(&self, n: u32) -> u8 {
        let mut seen = 0;
        for (bucket, &c) in self.coarse.iter().enumerate() {
            if seen + c > n {
                for v in bucket * 16..bucket * 16 + 16 {
                    seen += self.fine[v];
                    if seen > n {
                        return v as u8;
                    }
                }
            }
            seen += c;
        }
        255
    }

    fn get(&self, rank: Rank) -> u8 {
        match rank {
            Rank::Min => self.nth(0),
            Rank::Max => self.nth(self.count.saturating_sub(1)),
            Rank::Median => self.nth(self.count.saturating_sub(1) / 2),
        }
    }
}

/// Replace the colour of every visible pixel by the rank statistic of the
/// visible pixels inside a disc around it.  Alpha is kept; fully
/// transparent pixels neither contribute nor change.
fn rank_filter(img: &RgbaImage, radius: u32, rank: Rank) -> RgbaImage {
    let (w, h) = img.dimensions();
    let mut out = img.clone();
    if w == 0 || h == 0 || radius == 0 {
        return out;
    }
    let shape = disc_shape(radius);
    let r = radius as i64;

    let raw: &mut [u8] = &mut out;
    raw.par_chunks_mut(w as usize * 4).enumerate().for_each(|(y, row)| {
        let row: &mut [PixelRgba] = bytemuck::cast_slice_mut(row);
        let mut hist: [Histogram; 3] = Default::default();

        let visit = |hist: &mut [Histogram; 3], x: i64, dy: i64, add: bool| {
            let sy = y as i64 + dy;
            if x < 0 || x >= w as i64 || sy < 0 || sy >= h as i64 {
                return;
            }
            let p = rgba_row(img, sy as u32)[x as usize];
            if p.a == 0 {
                return;
            }
            for (hc, v) in hist.iter_mut().zip([p.r, p.g, p.b]) {
                if add { hc.insert(v) } else { hc.remove(v) }
            }
        };

        for (i, &half) in shape.iter().enumerate() {
            let dy = i as i64 - r;
            for dx in -(half as i64)..=half as i64 {
                visit(&mut hist, dx, dy, true);
            }
        }

        for x in 0..w as i64 {
            let d = &mut row[x as usize];
            if d.a != 0 {
                d.r = hist[0].get(rank);
                d.g = hist[1].get(rank);
                d.b = hist[2].get(rank);
            }
            for (i, &half) in shape.iter().enumerate() {
                let dy = i as i64 - r;
                visit(&mut hist, x - half as i64, dy, false);
                visit(&mut hist, x + 1 + half as i64, dy, true);
            }
        }
    });
    out
}

// ============================================================================
// BLUR
// ============================================================================

/// Gaussian blur standing in for three passes of a radius-`radius` disc
/// average (sigma ≈ 0.87 r).  Runs on premultiplied colour so transparent
/// pixels do not bleed black into their neighbours.
pub fn blur(img: &RgbaImage, radius: u32) -> RgbaImage {
    if radius == 0 || img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    let sigma = radius as f32 * 0.866;
    from_premultiplied(&imageops::blur(&to_premultiplied(img), sigma))
}

/// Premultiplied colour in 16 bits: channels hold `c * a`, alpha `a * 257`.
pub(crate) type Premultiplied = ImageBuffer<Rgba<u16>, Vec<u16>>;

pub(crate) fn to_premultiplied(img: &RgbaImage) -> Premultiplied {
    Premultiplied::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b, a] = img.get_pixel(x, y).0.map(u16::from);
        Rgba([r * a, g * a, b * a, a * 257])
    })
}

pub(crate) fn from_premultiplied(img: &Premultiplied) -> RgbaImage {
    RgbaImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b, a] = img.get_pixel(x, y).0.map(u32::from);
        if a == 0 {
            return Rgba([0, 0, 0, 0]);
        }
        let unpremultiply = |c: u32| ((c * 257 + a / 2) / a).min(255) as u8;
        Rgba([unpremultiply(r), unpremultiply(g), unpremultiply(b), ((a + 128) / 257) as u8])
    })
}
