// ============================================================================
// BRUSH STAMPS: intensity fields rasterised into gray operand layers
// ============================================================================

use image::{GrayImage, Luma};

use crate::canvas::{Layer, Point, TileBuffer, TileFormat, COORD_LIMIT};

/// Widest brush a stamp is rasterised for.
pub const MAX_BRUSH_SIZE: f64 = 4096.0;

/// Brush strength in `[0, 1]` at an offset from the brush centre.
pub trait IntensityField {
    fn level(&self, dx: f64, dy: f64) -> f64;
}

impl<F: Fn(f64, f64) -> f64> IntensityField for F {
    fn level(&self, dx: f64, dy: f64) -> f64 {
        self(dx, dy)
    }
}

/// Round brush with a hard core and a smooth falloff band.
///
/// `softness` 0 gives a hard disc; 1 fades from the centre outward.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoundBrush {
    radius: f64,
    blur: f64,
    mul: f64,
}

impl RoundBrush {
    pub fn new(size: f64, softness: f64) -> Self {
        let softness = softness.clamp(0.0, 1.0);
        let radius = size / 2.0 + 0.25;
        let blur = radius - radius * softness;
        let mul = if radius > blur { 1.0 / (radius - blur) } else { -1.0 };
        Self { radius, blur, mul }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl IntensityField for RoundBrush {
    fn level(&self, dx: f64, dy: f64) -> f64 {
        let d = dx.hypot(dy);
        if d > self.radius {
            return 0.0;
        }
        if d > self.blur && self.mul > 0.0 {
            let t = (d - self.blur) * self.mul;
            let u = 1.0 - t;
            return u * u * (u + 3.0 * t);
        }
        1.0
    }
}

/// Rasterise `field` into a single-tile gray operand layer covering a
/// `size` wide square centred on `(cx, cy)`.  Samples are taken at pixel
/// centres.
///
/// Non-finite input yields an empty layer.  The square is clamped to
/// `MAX_BRUSH_SIZE` and its origin to the document coordinate range.
pub fn stamp(cx: f64, cy: f64, field: &impl IntensityField, size: f64) -> Layer {
    if !(cx.is_finite() && cy.is_finite() && size.is_finite()) {
        return Layer::new_single(TileFormat::Gray);
    }
    let half = size.clamp(0.0, MAX_BRUSH_SIZE) / 2.0;
    let lim = COORD_LIMIT as i64;
    let edge = |v: f64| (v as i64).clamp(-lim, lim);
    let x0 = edge((cx - half).floor());
    let y0 = edge((cy - half).floor());
    let x1 = edge((cx + half).ceil());
    let y1 = edge((cy + half).ceil());
    let (w, h) = ((x1 - x0).max(0) as u32, (y1 - y0).max(0) as u32);
    if w == 0 || h == 0 {
        return Layer::new_single(TileFormat::Gray);
    }

    let img = GrayImage::from_fn(w, h, |j, i| {
        let tx = x0 as f64 + j as f64 - cx + 0.5;
        let ty = y0 as f64 + i as f64 - cy + 0.5;
        Luma([(field.level(tx, ty).clamp(0.0, 1.0) * 255.0) as u8])
    });
    Layer::from_buffer(Point::new(x0 as i32, y0 as i32), TileBuffer::Gray(img))
}
