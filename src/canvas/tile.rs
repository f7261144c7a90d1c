//! Tiles (owned pixel panels with an offset) and the shared handle the
//! layers store them behind.

use std::sync::Arc;

use image::{DynamicImage, GrayImage, RgbaImage};

use super::geom::{Point, Rect, Size};
use super::pixel::PixelRgba;

/// Edge length of a layer-managed tile.
pub const TILE_SIZE: u32 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TileFormat {
    Rgba,
    Gray,
}

/// Backing pixels of a tile.  Gray tiles carry a single 8-bit intensity
/// channel that doubles as coverage (selection degree, brush strength).
#[derive(Clone, Debug, PartialEq)]
pub enum TileBuffer {
    Rgba(RgbaImage),
    Gray(GrayImage),
}

impl TileBuffer {
    /// Background filled buffer: transparent for RGBA, zero for gray.
    pub fn new(format: TileFormat, width: u32, height: u32) -> Self {
        match format {
            TileFormat::Rgba => TileBuffer::Rgba(RgbaImage::new(width, height)),
            TileFormat::Gray => TileBuffer::Gray(GrayImage::new(width, height)),
        }
    }

    /// Normalise a decoded image: single channel stays gray, every other
    /// layout (RGB, 16 bit, float, with or without alpha) becomes RGBA8.
    pub fn from_dynamic(img: &DynamicImage) -> Self {
        match img {
            DynamicImage::ImageLuma8(gray) => TileBuffer::Gray(gray.clone()),
            other => TileBuffer::Rgba(other.to_rgba8()),
        }
    }

    pub fn format(&self) -> TileFormat {
        match self {
            TileBuffer::Rgba(_) => TileFormat::Rgba,
            TileBuffer::Gray(_) => TileFormat::Gray,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            TileBuffer::Rgba(img) => img.width(),
            TileBuffer::Gray(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            TileBuffer::Rgba(img) => img.height(),
            TileBuffer::Gray(img) => img.height(),
        }
    }
}

impl From<RgbaImage> for TileBuffer {
    fn from(img: RgbaImage) -> Self {
        TileBuffer::Rgba(img)
    }
}

impl From<GrayImage> for TileBuffer {
    fn from(img: GrayImage) -> Self {
        TileBuffer::Gray(img)
    }
}

/// View an RGBA scanline as pixels.
pub(crate) fn rgba_row(img: &RgbaImage, y: u32) -> &[PixelRgba] {
    let stride = img.width() as usize * 4;
    let start = y as usize * stride;
    bytemuck::cast_slice(&img.as_raw()[start..start + stride])
}

pub(crate) fn rgba_row_mut(img: &mut RgbaImage, y: u32) -> &mut [PixelRgba] {
    let stride = img.width() as usize * 4;
    let start = y as usize * stride;
    let raw: &mut [u8] = img;
    bytemuck::cast_slice_mut(&mut raw[start..start + stride])
}

pub(crate) fn gray_row(img: &GrayImage, y: u32) -> &[u8] {
    let stride = img.width() as usize;
    let start = y as usize * stride;
    &img.as_raw()[start..start + stride]
}

pub(crate) fn gray_row_mut(img: &mut GrayImage, y: u32) -> &mut [u8] {
    let stride = img.width() as usize;
    let start = y as usize * stride;
    let raw: &mut [u8] = img;
    &mut raw[start..start + stride]
}

/// A rectangular pixel panel positioned at `offset` relative to its layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    pub offset: Point,
    pub buffer: TileBuffer,
}

impl Tile {
    pub fn new(offset: Point, format: TileFormat, width: u32, height: u32) -> Self {
        Self { offset, buffer: TileBuffer::new(format, width, height) }
    }

    pub fn from_buffer(offset: Point, buffer: TileBuffer) -> Self {
        Self { offset, buffer }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    pub fn format(&self) -> TileFormat {
        self.buffer.format()
    }

    pub fn is_rgba(&self) -> bool {
        self.format() == TileFormat::Rgba
    }

    pub fn is_gray(&self) -> bool {
        self.format() == TileFormat::Gray
    }

    /// Footprint in layer coordinates.
    pub fn rect(&self) -> Rect {
        Rect::from_origin_size(self.offset, self.size())
    }

    pub fn rgba_pixel(&self, x: u32, y: u32) -> Option<PixelRgba> {
        match &self.buffer {
            TileBuffer::Rgba(img) if x < img.width() && y < img.height() => {
                Some((*img.get_pixel(x, y)).into())
            }
            _ => None,
        }
    }

    pub fn gray_pixel(&self, x: u32, y: u32) -> Option<u8> {
        match &self.buffer {
            TileBuffer::Gray(img) if x < img.width() && y < img.height() => {
                Some(img.get_pixel(x, y).0[0])
            }
            _ => None,
        }
    }

    /// Bounding box of non-background pixels, in tile-local coordinates.
    /// Background is alpha 0 for RGBA and intensity 0 for gray.
    pub fn content_rect(&self) -> Rect {
        let (w, h) = (self.width(), self.height());
        let row_has_content = |y: u32| -> Option<(u32, u32)> {
            let mut first = None;
            let mut last = 0;
            for x in 0..w {
                let set = match &self.buffer {
                    TileBuffer::Rgba(img) => rgba_row(img, y)[x as usize].a != 0,
                    TileBuffer::Gray(img) => gray_row(img, y)[x as usize] != 0,
                };
                if set {
                    first.get_or_insert(x);
                    last = x;
                }
            }
            first.map(|f| (f, last))
        };

        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for y in 0..h {
            if let Some((x0, x1)) = row_has_content(y) {
                bounds = Some(match bounds {
                    None => (x0, y, x1, y),
                    Some((bx0, by0, bx1, _)) => (bx0.min(x0), by0, bx1.max(x1), y),
                });
            }
        }
        match bounds {
            Some((x0, y0, x1, y1)) => Rect::new(
                x0 as i32,
                y0 as i32,
                (x1 - x0 + 1) as i32,
                (y1 - y0 + 1) as i32,
            ),
            None => Rect::EMPTY,
        }
    }

    pub fn is_blank(&self) -> bool {
        match &self.buffer {
            TileBuffer::Rgba(img) => img.pixels().all(|p| p.0[3] == 0),
            TileBuffer::Gray(img) => img.as_raw().iter().all(|&v| v == 0),
        }
    }
}

// ============================================================================
// TILE HANDLE
// ============================================================================

/// Shared, reference counted tile.
///
/// Cloning a handle only bumps the count, so the document, snapshots and
/// intermediate render buffers can all hold the same pixels.  Writers go
/// through [`TileHandle::make_mut`], which detaches a private copy first when
/// the tile is shared; an explicit detached copy is [`TileHandle::deep_clone`].
/// "Null" handles are spelled `Option<TileHandle>`.
#[derive(Clone, Debug)]
pub struct TileHandle(Arc<Tile>);

impl TileHandle {
    pub fn new(tile: Tile) -> Self {
        Self(Arc::new(tile))
    }

    /// Allocate a background-filled tile and wrap it.
    pub fn make_image(offset: Point, format: TileFormat, width: u32, height: u32) -> Self {
        Self::new(Tile::new(offset, format, width, height))
    }

    /// Copy of the pixels behind a fresh count of one.
    pub fn deep_clone(&self) -> Self {
        Self::new((*self.0).clone())
    }

    /// Mutable access; clones the tile first if another handle shares it.
    pub fn make_mut(&mut self) -> &mut Tile {
        Arc::make_mut(&mut self.0)
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn ptr_eq(&self, other: &TileHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::ops::Deref for TileHandle {
    type Target = Tile;

    fn deref(&self) -> &Tile {
        &self.0
    }
}
