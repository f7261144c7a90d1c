//! Pixel types and the alpha compositing arithmetic used by every blit.
//!
//! All 8-bit pixels are straight (non-premultiplied) alpha.  Colour channels
//! of a pixel with `a == 0` carry no meaning and are never read unweighted.

use std::ops::{Add, Div, Mul, Sub};
use std::sync::OnceLock;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

// ============================================================================
// 8-BIT PIXELS
// ============================================================================

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct PixelRgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl PixelRgba {
    pub const TRANSPARENT: PixelRgba = PixelRgba::new(0, 0, 0, 0);
    pub const WHITE: PixelRgba = PixelRgba::new(255, 255, 255, 255);
    pub const BLACK: PixelRgba = PixelRgba::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Luma of the colour channels (alpha ignored).
    pub fn luma(self) -> u8 {
        gray(self.r, self.g, self.b)
    }
}

impl From<image::Rgba<u8>> for PixelRgba {
    fn from(p: image::Rgba<u8>) -> Self {
        let [r, g, b, a] = p.0;
        Self { r, g, b, a }
    }
}

impl From<PixelRgba> for image::Rgba<u8> {
    fn from(p: PixelRgba) -> Self {
        image::Rgba([p.r, p.g, p.b, p.a])
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct PixelGrayA {
    pub l: u8,
    pub a: u8,
}

impl PixelGrayA {
    pub const fn new(l: u8, a: u8) -> Self {
        Self { l, a }
    }

    pub const fn opaque(l: u8) -> Self {
        Self { l, a: 255 }
    }
}

/// Fast `v / 255` (truncating) for `v` in `0..=255*255`; exact over that range.
#[inline(always)]
pub fn div255(v: i32) -> i32 {
    (v * 257 + 256) / 65536
}

/// RGB to gray with the 306/601/117 weights (sum 1024).
#[inline(always)]
pub fn gray(r: u8, g: u8, b: u8) -> u8 {
    ((306 * r as u32 + 601 * g as u32 + 117 * b as u32) / 1024) as u8
}

/// Straight-alpha "over" composite in the integer domain.
#[inline]
pub fn blend(base: PixelRgba, over: PixelRgba) -> PixelRgba {
    if over.a == 0 {
        return base;
    }
    if base.a == 0 || over.a == 255 {
        return over;
    }
    let oa = over.a as i32;
    let ba = base.a as i32;
    let inv = 255 - oa;
    let r = over.r as i32 * oa * 255 + base.r as i32 * ba * inv;
    let g = over.g as i32 * oa * 255 + base.g as i32 * ba * inv;
    let b = over.b as i32 * oa * 255 + base.b as i32 * ba * inv;
    let a = oa * 255 + ba * inv;
    PixelRgba::new((r / a) as u8, (g / a) as u8, (b / a) as u8, div255(a) as u8)
}

#[inline]
pub fn blend_gray(base: PixelGrayA, over: PixelGrayA) -> PixelGrayA {
    if over.a == 0 {
        return base;
    }
    if base.a == 0 || over.a == 255 {
        return over;
    }
    let oa = over.a as i32;
    let ba = base.a as i32;
    let inv = 255 - oa;
    let l = over.l as i32 * oa * 255 + base.l as i32 * ba * inv;
    let a = oa * 255 + ba * inv;
    PixelGrayA::new((l / a) as u8, div255(a) as u8)
}

// ============================================================================
// FLOATING POINT PATH
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FPixelRgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

#[inline(always)]
fn unit_to_u8(v: f32) -> u8 {
    if v <= 0.0 {
        0
    } else if v >= 1.0 {
        255
    } else {
        (v * 255.0 + 0.5).floor() as u8
    }
}

impl FPixelRgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Square each colour channel (gamma 2 to linear).
    pub fn degamma(self) -> Self {
        Self::new(self.r * self.r, self.g * self.g, self.b * self.b, self.a)
    }

    /// Square root of each colour channel (linear back to gamma 2).
    pub fn gamma(self) -> Self {
        Self::new(self.r.sqrt(), self.g.sqrt(), self.b.sqrt(), self.a)
    }

    pub fn to_pixel(self) -> PixelRgba {
        PixelRgba::new(
            unit_to_u8(self.r),
            unit_to_u8(self.g),
            unit_to_u8(self.b),
            unit_to_u8(self.a),
        )
    }
}

impl From<PixelRgba> for FPixelRgba {
    fn from(p: PixelRgba) -> Self {
        Self::new(
            p.r as f32 / 255.0,
            p.g as f32 / 255.0,
            p.b as f32 / 255.0,
            p.a as f32 / 255.0,
        )
    }
}

pub fn blend_f32(base: FPixelRgba, over: FPixelRgba) -> FPixelRgba {
    if over.a <= 0.0 {
        return base;
    }
    if base.a <= 0.0 || over.a >= 1.0 {
        return over;
    }
    let inv = base.a * (1.0 - over.a);
    let r = over.r * over.a + base.r * inv;
    let g = over.g * over.a + base.g * inv;
    let b = over.b * over.a + base.b * inv;
    let a = over.a + inv;
    FPixelRgba::new(r / a, g / a, b / a, a)
}

/// "Over" composite performed in gamma-2 linearised space.
///
/// Blending straight 8-bit values darkens soft edges; squaring the channels
/// first and taking the root afterwards removes the dark fringe.
pub fn blend_with_gamma(base: PixelRgba, over: PixelRgba) -> PixelRgba {
    if over.a == 0 {
        return base;
    }
    if base.a == 0 || over.a == 255 {
        return over;
    }
    let base = FPixelRgba::from(base).degamma();
    let over = FPixelRgba::from(over).degamma();
    blend_f32(base, over).gamma().to_pixel()
}

// ============================================================================
// 12-BIT FIXED POINT PATH
// ============================================================================

const FRAC_BITS: u32 = 12;
const FIXED_ONE: i16 = 1 << FRAC_BITS;

/// 4.12 signed fixed point value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Fixed(i16);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(FIXED_ONE);

    pub const fn from_raw(raw: i16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i16 {
        self.0
    }

    pub fn from_u8(v: u8) -> Self {
        Self((v as i32 * FIXED_ONE as i32 / 255) as i16)
    }

    pub fn from_f32(v: f32) -> Self {
        Self((v * FIXED_ONE as f32 + 0.5).floor() as i16)
    }

    pub fn to_u8(self) -> u8 {
        if self.0 < 0 {
            0
        } else if self.0 > 0x0fff {
            255
        } else {
            (self.0 >> 4) as u8
        }
    }

    pub fn to_f32(self) -> f32 {
        self.0 as f32 / FIXED_ONE as f32
    }

    pub fn degamma(self) -> Self {
        self * self
    }

    pub fn gamma(self) -> Self {
        if self.0 <= 0 {
            return Fixed::ZERO;
        }
        if self.0 >= FIXED_ONE {
            return Fixed::ONE;
        }
        Fixed(sqrt_table()[self.0 as usize])
    }
}

fn sqrt_table() -> &'static [i16] {
    static TABLE: OnceLock<Box<[i16]>> = OnceLock::new();
    TABLE.get_or_init(|| {
        (0..=FIXED_ONE as u32)
            .map(|i| {
                let v = (i as f32 / FIXED_ONE as f32).sqrt();
                (v * FIXED_ONE as f32 + 0.5).floor() as i16
            })
            .collect()
    })
}

impl Add for Fixed {
    type Output = Fixed;
    fn add(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for Fixed {
    type Output = Fixed;
    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.wrapping_sub(rhs.0))
    }
}

impl Mul for Fixed {
    type Output = Fixed;
    fn mul(self, rhs: Fixed) -> Fixed {
        Fixed(((self.0 as i32 * rhs.0 as i32) >> FRAC_BITS) as i16)
    }
}

impl Div for Fixed {
    type Output = Fixed;
    /// Round-to-nearest divide.
    fn div(self, rhs: Fixed) -> Fixed {
        debug_assert!(rhs.0 != 0, "fixed point division by zero");
        let num = ((self.0 as i32) << FRAC_BITS) + rhs.0 as i32 / 2;
        Fixed((num / rhs.0 as i32) as i16)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FixedRgba {
    pub r: Fixed,
    pub g: Fixed,
    pub b: Fixed,
    pub a: Fixed,
}

impl FixedRgba {
    fn map_color(self, f: impl Fn(Fixed) -> Fixed) -> Self {
        Self { r: f(self.r), g: f(self.g), b: f(self.b), a: self.a }
    }

    pub fn to_pixel(self) -> PixelRgba {
        PixelRgba::new(self.r.to_u8(), self.g.to_u8(), self.b.to_u8(), self.a.to_u8())
    }
}

impl From<PixelRgba> for FixedRgba {
    fn from(p: PixelRgba) -> Self {
        Self {
            r: Fixed::from_u8(p.r),
            g: Fixed::from_u8(p.g),
            b: Fixed::from_u8(p.b),
            a: Fixed::from_u8(p.a),
        }
    }
}

pub fn blend_fixed(base: FixedRgba, over: FixedRgba) -> FixedRgba {
    if over.a <= Fixed::ZERO {
        return base;
    }
    if base.a <= Fixed::ZERO || over.a >= Fixed::ONE {
        return over;
    }
    let inv = base.a * (Fixed::ONE - over.a);
    let a = over.a + inv;
    FixedRgba {
        r: (over.r * over.a + base.r * inv) / a,
        g: (over.g * over.a + base.g * inv) / a,
        b: (over.b * over.a + base.b * inv) / a,
        a,
    }
}

/// Fixed point twin of [`blend_with_gamma`].
pub fn blend_with_gamma_fixed(base: PixelRgba, over: PixelRgba) -> PixelRgba {
    if over.a == 0 {
        return base;
    }
    if base.a == 0 || over.a == 255 {
        return over;
    }
    let base = FixedRgba::from(base).map_color(Fixed::degamma);
    let over = FixedRgba::from(over).map_color(Fixed::degamma);
    blend_fixed(base, over).map_color(Fixed::gamma).to_pixel()
}

/// Which arithmetic the gamma-corrected blend runs in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendPrecision {
    #[default]
    Float,
    Fixed,
}

impl BlendPrecision {
    #[inline]
    pub fn blend(self, base: PixelRgba, over: PixelRgba) -> PixelRgba {
        match self {
            BlendPrecision::Float => blend_with_gamma(base, over),
            BlendPrecision::Fixed => blend_with_gamma_fixed(base, over),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: PixelRgba, b: PixelRgba, tol: i32) -> bool {
        (a.r as i32 - b.r as i32).abs() <= tol
            && (a.g as i32 - b.g as i32).abs() <= tol
            && (a.b as i32 - b.b as i32).abs() <= tol
            && (a.a as i32 - b.a as i32).abs() <= tol
    }

    #[test]
    fn div255_is_exact_over_product_range() {
        for v in 0..=255 * 255 {
            assert_eq!(div255(v), v / 255, "v = {v}");
        }
    }

    #[test]
    fn gray_weights() {
        assert_eq!(gray(255, 255, 255), 255);
        assert_eq!(gray(0, 0, 0), 0);
        assert_eq!(gray(255, 0, 0), 76);
        assert_eq!(gray(0, 255, 0), 149);
        assert_eq!(gray(0, 0, 255), 29);
    }

    #[test]
    fn blend_degenerate_cases() {
        let base = PixelRgba::new(10, 20, 30, 200);
        let over = PixelRgba::new(200, 100, 50, 0);
        assert_eq!(blend(base, over), base);
        assert_eq!(blend(PixelRgba::TRANSPARENT, over.with_alpha(7)), over.with_alpha(7));
        assert_eq!(blend(base, over.with_alpha(255)), over.with_alpha(255));
    }

    #[test]
    fn blend_half_over_opaque() {
        let base = PixelRgba::opaque(0, 0, 0);
        let over = PixelRgba::new(255, 255, 255, 128);
        let out = blend(base, over);
        assert_eq!(out.a, 255);
        assert_eq!(out.r, 128);
    }

    #[test]
    fn gray_blend_is_a_lerp_on_opaque_base() {
        let out = blend_gray(PixelGrayA::opaque(0), PixelGrayA::new(255, 51));
        assert_eq!(out, PixelGrayA::new(51, 255));
    }

    #[test]
    fn gamma_blend_is_lighter_than_linear() {
        let base = PixelRgba::opaque(0, 0, 0);
        let over = PixelRgba::new(255, 255, 255, 128);
        let linear = blend(base, over);
        let gamma = blend_with_gamma(base, over);
        assert!(gamma.r > linear.r);
        assert_eq!(gamma.a, 255);
    }

    #[test]
    fn gamma_round_trip_within_one_lsb() {
        for c in 0..=255u8 {
            let p = PixelRgba::new(c, 255 - c, c / 2, 255);
            let back = FPixelRgba::from(p).degamma().gamma().to_pixel();
            assert!(close(p, back, 1), "{p:?} -> {back:?}");
        }
    }

    #[test]
    fn fixed_arithmetic() {
        let half = Fixed::from_f32(0.5);
        assert_eq!((half * half).to_f32(), 0.25);
        assert_eq!((Fixed::from_f32(0.25) / half).raw(), half.raw());
        assert_eq!(Fixed::from_u8(255), Fixed::ONE);
        assert_eq!(Fixed::ONE.to_u8(), 255);
        assert_eq!(Fixed::from_raw(-5).to_u8(), 0);
        assert_eq!(Fixed::from_f32(0.25).gamma(), half);
    }

    #[test]
    fn fixed_gamma_blend_tracks_float() {
        let base = PixelRgba::new(40, 90, 200, 255);
        for a in [1u8, 64, 128, 200, 254] {
            let over = PixelRgba::new(250, 10, 60, a);
            let f = blend_with_gamma(base, over);
            let x = blend_with_gamma_fixed(base, over);
            assert!(close(f, x, 3), "alpha {a}: {f:?} vs {x:?}");
        }
    }
}
