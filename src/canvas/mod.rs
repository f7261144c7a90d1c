// ============================================================================
// CANVAS MODULE: tiled layers, compositing and the paint document
// ============================================================================
//
// Architecture:
//   geom.rs       : integer points, sizes, rectangles
//   pixel.rs      : pixel types, blend / gamma blend, 4.12 fixed point
//   tile.rs       : Tile panels and the shared TileHandle
//   layer.rs      : sorted tile grids and single-tile operand layers
//   compositor.rs : blit_tile / fan-out / layer-onto-layer painting
//   document.rs   : current image + selection, render entry points
//   sync.rs       : document mutex and abort flag
// ============================================================================

pub mod compositor;
pub mod document;
pub mod geom;
pub mod layer;
pub mod pixel;
pub mod sync;
pub mod tile;

pub use compositor::{
    blit_tile, fan_out_to_rgba, fan_out_to_tile, paint_layer_onto_layer, render_layer_gray,
    render_layer_rgba, RenderMode, RenderOptions,
};
pub use document::{Document, RenderConfig, SelectionOp, SelectionState, SharedDocument};
pub use geom::{Point, Rect, Size, COORD_LIMIT};
pub use layer::Layer;
pub use pixel::{BlendPrecision, PixelGrayA, PixelRgba};
pub use sync::{AbortFlag, Synchronizer};
pub use tile::{Tile, TileBuffer, TileFormat, TileHandle, TILE_SIZE};
