//! The paint document: one visible image layer plus a selection mask.

use image::{imageops, GrayImage, ImageBuffer, Pixel, RgbaImage};
use log::{debug, info, warn};

use super::compositor::{
    fan_out_to_rgba, paint_layer_onto_layer, render_layer_gray, render_layer_rgba, RenderOptions,
};
use super::geom::{Point, Rect, Size};
use super::layer::Layer;
use super::pixel::{BlendPrecision, PixelRgba};
use super::sync::{aborted, AbortFlag, Synchronizer};
use super::tile::{TileBuffer, TileFormat};
use crate::ops::outline::selection_outline;

/// Render settings a document needs on its own.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderConfig {
    /// Tint laid over the unselected area in quick-mask previews.
    pub quickmask_color: PixelRgba,
    pub quickmask_opacity: u8,
    pub precision: BlendPrecision,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            quickmask_color: PixelRgba::opaque(255, 0, 0),
            quickmask_opacity: 128,
            precision: BlendPrecision::Float,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionOp {
    /// Replace the selection.
    Set,
    Add,
    Sub,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionState {
    Empty,
    Active,
}

/// Image document with exactly two layers for its whole lifetime.
///
/// `current_layer` is tiled RGBA and holds the visible picture.
/// `selection_layer` is tiled gray; each value is the degree to which that
/// pixel is selected.  Both may hold tiles outside `[0, size)`, which are
/// kept but never rendered.
///
/// Cloning is cheap: tiles are shared until one side writes.
#[derive(Clone, Debug)]
pub struct Document {
    size: Size,
    current_layer: Layer,
    selection_layer: Layer,
    config: RenderConfig,
}

impl Document {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_config(width, height, RenderConfig::default())
    }

    pub fn with_config(width: u32, height: u32, config: RenderConfig) -> Self {
        Self {
            size: Size::new(width, height),
            current_layer: Layer::new_tiled(TileFormat::Rgba),
            selection_layer: Layer::new_tiled(TileFormat::Gray),
            config,
        }
    }

    // ---- accessors ----------------------------------------------------------

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        info!("document resized {}x{} -> {width}x{height}", self.size.width, self.size.height);
        self.size = Size::new(width, height);
    }

    /// `[0, size)` in document space.
    pub fn bounds(&self) -> Rect {
        Rect::from_origin_size(Point::ZERO, self.size)
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: RenderConfig) {
        self.config = config;
    }

    pub fn current_layer(&self) -> &Layer {
        &self.current_layer
    }

    pub fn selection_layer(&self) -> &Layer {
        &self.selection_layer
    }

    fn blend_options(&self) -> RenderOptions {
        RenderOptions::default().with_precision(self.config.precision)
    }

    // ---- editing ------------------------------------------------------------

    /// Composite `source` (usually a brush stamp) onto the image, confined to
    /// the selection when one exists.
    pub fn paint_to_current_layer(
        &mut self,
        source: &Layer,
        opts: &RenderOptions,
        abort: Option<&AbortFlag>,
    ) {
        let mask = (!self.selection_layer.is_empty()).then_some(&self.selection_layer);
        paint_layer_onto_layer(&mut self.current_layer, source, mask, opts, abort);
    }

    /// Grow the selection by the coverage of `source`.
    pub fn add_selection(&mut self, source: &Layer, opts: &RenderOptions, abort: Option<&AbortFlag>) {
        let opts = opts.with_color(PixelRgba::WHITE);
        paint_layer_onto_layer(&mut self.selection_layer, source, None, &opts, abort);
        debug!("selection grown by {:?}", source.bounds());
    }

    /// Shrink the selection by the coverage of `source`.
    pub fn sub_selection(&mut self, source: &Layer, opts: &RenderOptions, abort: Option<&AbortFlag>) {
        let opts = opts.with_color(PixelRgba::BLACK);
        paint_layer_onto_layer(&mut self.selection_layer, source, None, &opts, abort);
        // Fully deselected tiles would otherwise keep masking every paint.
        self.selection_layer.prune_empty();
        debug!("selection shrunk by {:?}", source.bounds());
    }

    pub fn clear_selection(&mut self) {
        self.selection_layer.clear();
        debug!("selection cleared");
    }

    /// Drop all image and selection content.  The size is kept.
    pub fn clear(&mut self) {
        self.current_layer.clear();
        self.selection_layer.clear();
        info!("document cleared");
    }

    /// Apply a rectangular selection edit.
    pub fn change_selection(&mut self, op: SelectionOp, rect: Rect) {
        if op == SelectionOp::Set {
            self.clear_selection();
        }
        if rect.is_empty() {
            return;
        }
        if !rect.within_limits() {
            warn!("selection {rect:?} lies outside the document coordinate range");
            return;
        }
        let size = rect.size();
        let patch = GrayImage::from_pixel(size.width, size.height, image::Luma([255]));
        let operand = Layer::from_buffer(rect.origin(), TileBuffer::Gray(patch));
        let opts = self.blend_options();
        match op {
            SelectionOp::Set | SelectionOp::Add => self.add_selection(&operand, &opts, None),
            SelectionOp::Sub => self.sub_selection(&operand, &opts, None),
        }
    }

    pub fn selection_state(&self) -> SelectionState {
        if self.selection_rect().is_empty() {
            SelectionState::Empty
        } else {
            SelectionState::Active
        }
    }

    pub fn selection_rect(&self) -> Rect {
        self.selection_layer.rect()
    }

    /// Replace the document by `image`: size follows the image, the
    /// selection is dropped and the pixels are scattered into tiles.  Gray
    /// images become opaque gray RGBA.
    pub fn set_image(&mut self, image: impl Into<TileBuffer>) {
        let buffer = image.into();
        let (w, h) = (buffer.width(), buffer.height());
        self.set_size(w, h);
        self.clear();

        let operand = Layer::from_buffer(Point::ZERO, buffer);
        paint_layer_onto_layer(&mut self.current_layer, &operand, None, &RenderOptions::direct_copy(), None);
        self.current_layer.prune_empty();
        info!("image set: {w}x{h} in {} tiles", self.current_layer.tile_count());
    }

    // ---- rendering ----------------------------------------------------------

    /// Flatten the image over `rect`.  With `quickmask` the unselected area
    /// is tinted.  `None` means the render observed `abort`.
    pub fn render_to_layer(&self, rect: Rect, quickmask: bool, abort: Option<&AbortFlag>) -> Option<RgbaImage> {
        let visible = rect.intersect(&self.bounds());
        let opts = self.blend_options();
        let mut img = render_layer_rgba(&self.current_layer, visible, None, &opts, abort);

        if quickmask && !self.selection_layer.is_empty() && !visible.is_empty() {
            let coverage = render_layer_gray(&self.selection_layer, visible, None, &RenderOptions::default(), abort);
            let operand = Layer::from_buffer(visible.origin(), TileBuffer::Gray(coverage));
            let tint = opts
                .with_color(self.config.quickmask_color)
                .with_opacity(self.config.quickmask_opacity)
                .inverted();
            fan_out_to_rgba(&mut img, visible.origin(), &operand, None, &tint, abort);
        }

        if aborted(abort) {
            debug!("render of {rect:?} aborted");
            return None;
        }
        Some(place(rect, visible, img))
    }

    /// Flatten the selection mask over `rect`.
    pub fn render_selection(&self, rect: Rect, abort: Option<&AbortFlag>) -> Option<GrayImage> {
        let visible = rect.intersect(&self.bounds());
        let img = render_layer_gray(&self.selection_layer, visible, None, &RenderOptions::default(), abort);
        if aborted(abort) {
            debug!("selection render of {rect:?} aborted");
            return None;
        }
        Some(place(rect, visible, img))
    }

    /// Selected pixels of the image over `rect`.  Without a selection the
    /// whole image is taken.
    pub fn crop(&self, rect: Rect, abort: Option<&AbortFlag>) -> Option<RgbaImage> {
        let visible = rect.intersect(&self.bounds());
        let mask = (!self.selection_layer.is_empty()).then_some(&self.selection_layer);
        let img = render_layer_rgba(&self.current_layer, visible, mask, &self.blend_options(), abort);
        if aborted(abort) {
            debug!("crop of {rect:?} aborted");
            return None;
        }
        Some(place(rect, visible, img))
    }

    /// The selected pixels, cut to the selection's bounding box.
    pub fn selected_image(&self, abort: Option<&AbortFlag>) -> Option<RgbaImage> {
        let rect = self.selection_rect().intersect(&self.bounds());
        self.crop(rect, abort)
    }

    /// Shrink the document to the selected pixels.  Returns `false` (and
    /// leaves the document alone) when nothing is selected or on abort.
    pub fn trim(&mut self, abort: Option<&AbortFlag>) -> bool {
        let rect = self.selection_rect().intersect(&self.bounds());
        if rect.is_empty() {
            return false;
        }
        let Some(img) = self.crop(rect, abort) else {
            return false;
        };
        info!("trimming to {rect:?}");
        self.set_image(img);
        true
    }
}

/// Position `img` (rendered over `visible`) inside a blank buffer for `rect`.
fn place<P: Pixel>(
    rect: Rect,
    visible: Rect,
    img: ImageBuffer<P, Vec<P::Subpixel>>,
) -> ImageBuffer<P, Vec<P::Subpixel>> {
    if visible == rect {
        return img;
    }
    let size = rect.size();
    let mut out = ImageBuffer::new(size.width, size.height);
    if !visible.is_empty() {
        imageops::replace(&mut out, &img, (visible.x - rect.x) as i64, (visible.y - rect.y) as i64);
    }
    out
}

// ============================================================================
// SHARED DOCUMENT
// ============================================================================

/// A document shared between its owner thread and render workers.
pub type SharedDocument = std::sync::Arc<Synchronizer<Document>>;

impl Synchronizer<Document> {
    /// Consistent copy of the document, taken under the lock.  Only tile
    /// handles are copied.
    pub fn snapshot(&self) -> Document {
        self.lock().clone()
    }

    pub fn render(&self, rect: Rect, quickmask: bool) -> Option<RgbaImage> {
        self.snapshot().render_to_layer(rect, quickmask, Some(self.abort_flag()))
    }

    pub fn render_selection(&self, rect: Rect) -> Option<GrayImage> {
        self.snapshot().render_selection(rect, Some(self.abort_flag()))
    }

    pub fn crop(&self, rect: Rect) -> Option<RgbaImage> {
        self.snapshot().crop(rect, Some(self.abort_flag()))
    }

    /// Edge map of the selection over `rect` (0 on the outline, 255 elsewhere).
    pub fn render_selection_outline(&self, rect: Rect) -> Option<GrayImage> {
        let selection = self.render_selection(rect)?;
        selection_outline(&selection, Some(self.abort_flag()))
    }
}
