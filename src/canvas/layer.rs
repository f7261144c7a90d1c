//! Layers: sparse, sorted tile grids (tiled) or single-rectangle operands.

use rayon::prelude::*;

use super::geom::{Point, Rect};
use super::pixel::PixelRgba;
use super::tile::{Tile, TileBuffer, TileFormat, TileHandle, TILE_SIZE};
use crate::error::{Error, Result};

/// Top-left corner of the tile-grid cell containing `p`.
pub fn cell_origin(p: Point) -> Point {
    let s = TILE_SIZE as i32;
    Point::new(p.x.div_euclid(s) * s, p.y.div_euclid(s) * s)
}

#[inline]
fn sort_key(offset: Point) -> (i32, i32) {
    (offset.y, offset.x)
}

/// A set of tiles plus a layer-level offset.
///
/// Tiled layers hold only `TILE_SIZE` square tiles on grid-aligned offsets,
/// sorted by (row, column) so point lookup is a binary search.  Non-tiled
/// layers hold zero or one tile of any size and serve as operands: brush
/// stamps, selection rectangles, freshly loaded pictures.
#[derive(Clone, Debug)]
pub struct Layer {
    pub offset: Point,
    tiled: bool,
    format: TileFormat,
    tiles: Vec<TileHandle>,
}

impl Layer {
    // ---- construction -------------------------------------------------------

    pub fn new_tiled(format: TileFormat) -> Self {
        Self { offset: Point::ZERO, tiled: true, format, tiles: Vec::new() }
    }

    /// Empty non-tiled operand layer.
    pub fn new_single(format: TileFormat) -> Self {
        Self { offset: Point::ZERO, tiled: false, format, tiles: Vec::new() }
    }

    /// Non-tiled layer wrapping `buffer` at `offset`.
    pub fn from_buffer(offset: Point, buffer: TileBuffer) -> Self {
        let mut layer = Self::new_single(buffer.format());
        layer.set_single_image(offset, buffer);
        layer
    }

    /// Wrap a caller supplied 8-bit intensity buffer (row-major, `w * h` bytes).
    pub fn from_raw_gray(offset: Point, width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        let actual = data.len();
        let img = image::GrayImage::from_raw(width, height, data)
            .ok_or(Error::BufferSize { expected, actual })?;
        if actual != expected {
            return Err(Error::BufferSize { expected, actual });
        }
        Ok(Self::from_buffer(offset, TileBuffer::Gray(img)))
    }

    /// Wrap a caller supplied RGBA8 buffer (row-major, `w * h * 4` bytes).
    pub fn from_raw_rgba(offset: Point, width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        let actual = data.len();
        let img = image::RgbaImage::from_raw(width, height, data)
            .ok_or(Error::BufferSize { expected, actual })?;
        if actual != expected {
            return Err(Error::BufferSize { expected, actual });
        }
        Ok(Self::from_buffer(offset, TileBuffer::Rgba(img)))
    }

    // ---- accessors ----------------------------------------------------------

    pub fn is_tiled(&self) -> bool {
        self.tiled
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }

    pub fn tiles(&self) -> &[TileHandle] {
        &self.tiles
    }

    pub(crate) fn tiles_mut(&mut self) -> &mut [TileHandle] {
        &mut self.tiles
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    // ---- tile lifecycle -----------------------------------------------------

    /// Allocate a background tile at grid-aligned `(x, y)` of a tiled layer.
    pub fn add_tile(&mut self, x: i32, y: i32) -> &mut TileHandle {
        self.add_tile_sized(x, y, TILE_SIZE, TILE_SIZE)
    }

    /// Allocate a background tile of arbitrary size.  Tiled layers still
    /// require aligned `TILE_SIZE` tiles; a non-tiled layer takes one tile.
    pub fn add_tile_sized(&mut self, x: i32, y: i32, width: u32, height: u32) -> &mut TileHandle {
        let offset = Point::new(x, y);
        if self.tiled {
            assert!(
                width == TILE_SIZE && height == TILE_SIZE && cell_origin(offset) == offset,
                "tiled layer tile must be {TILE_SIZE}x{TILE_SIZE} at an aligned offset, got {width}x{height} at {offset:?}"
            );
        } else {
            assert!(self.tiles.is_empty(), "non-tiled layer already holds a tile");
        }

        let handle = TileHandle::make_image(offset, self.format, width, height);
        let idx = match self.tiles.binary_search_by_key(&sort_key(offset), |t| sort_key(t.offset)) {
            Ok(_) => panic!("duplicate tile at {offset:?}"),
            Err(idx) => idx,
        };
        self.tiles.insert(idx, handle);
        &mut self.tiles[idx]
    }

    /// Index of the tile covering layer-space point `(x, y)`.
    fn position(&self, x: i32, y: i32) -> Option<usize> {
        let p = Point::new(x, y);
        if self.tiled {
            let key = sort_key(cell_origin(p));
            self.tiles.binary_search_by_key(&key, |t| sort_key(t.offset)).ok()
        } else {
            self.tiles.iter().position(|t| t.rect().contains(p))
        }
    }

    /// Tile covering layer-space point `(x, y)`, if any.
    pub fn find_tile(&self, x: i32, y: i32) -> Option<&TileHandle> {
        self.position(x, y).map(|i| &self.tiles[i])
    }

    pub fn find_tile_mut(&mut self, x: i32, y: i32) -> Option<&mut TileHandle> {
        self.position(x, y).map(move |i| &mut self.tiles[i])
    }

    /// Lookup-or-create for the grid cell containing `(x, y)`.  Returns the
    /// handle and whether it was freshly created.
    pub fn tile_or_insert(&mut self, x: i32, y: i32) -> (&mut TileHandle, bool) {
        debug_assert!(self.tiled);
        let cell = cell_origin(Point::new(x, y));
        match self.tiles.binary_search_by_key(&sort_key(cell), |t| sort_key(t.offset)) {
            Ok(idx) => (&mut self.tiles[idx], false),
            Err(_) => (self.add_tile(cell.x, cell.y), true),
        }
    }

    /// Drop every tile and reset the offset.
    pub fn clear(&mut self) {
        self.tiles.clear();
        self.offset = Point::ZERO;
    }

    /// Replace the contents by a single tile wrapping `buffer`.
    pub fn set_single_image(&mut self, offset: Point, buffer: TileBuffer) {
        assert!(!self.tiled, "set_single_image on a tiled layer");
        self.format = buffer.format();
        self.tiles.clear();
        self.tiles.push(TileHandle::new(Tile::from_buffer(offset, buffer)));
    }

    /// Release tiles that hold only background pixels.
    pub fn prune_empty(&mut self) {
        self.tiles.retain(|t| !t.is_blank());
    }

    // ---- queries ------------------------------------------------------------

    /// Bounding box of non-background content in document space.
    /// Scans every pixel of every tile (in parallel across tiles).
    pub fn rect(&self) -> Rect {
        let layer_offset = self.offset;
        self.tiles
            .par_iter()
            .map(|t| t.content_rect().translated(t.offset + layer_offset))
            .reduce(|| Rect::EMPTY, |a, b| a.union(&b))
    }

    /// Document-space footprint of the allocated tiles, blank or not.
    /// Unlike [`Layer::rect`] this does not look at pixels.
    pub fn bounds(&self) -> Rect {
        self.tiles
            .iter()
            .fold(Rect::EMPTY, |acc, t| acc.union(&t.rect().translated(self.offset)))
    }

    /// Colour at a document-space point (transparent where no tile exists).
    pub fn rgba_at(&self, x: i32, y: i32) -> PixelRgba {
        let p = Point::new(x, y) - self.offset;
        self.find_tile(p.x, p.y)
            .and_then(|t| t.rgba_pixel((p.x - t.offset.x) as u32, (p.y - t.offset.y) as u32))
            .unwrap_or(PixelRgba::TRANSPARENT)
    }

    /// Intensity at a document-space point (zero where no tile exists).
    pub fn gray_at(&self, x: i32, y: i32) -> u8 {
        let p = Point::new(x, y) - self.offset;
        self.find_tile(p.x, p.y)
            .and_then(|t| t.gray_pixel((p.x - t.offset.x) as u32, (p.y - t.offset.y) as u32))
            .unwrap_or(0)
    }
}
