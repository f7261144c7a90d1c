// ============================================================================
// OPS: operand builders and analyses layered on top of the canvas
// ============================================================================
//
//   brush.rs   : brush intensity fields and stamp operand layers
//   stroke.rs  : Bézier-smoothed pen paths turned into evenly spaced dabs
//   filters.rs : rank filters (median / maximize / minimize) and blur
//   resize.rs  : image scaling
//   outline.rs : selection edge extraction for marching-ants display
// ============================================================================

pub mod brush;
pub mod filters;
pub mod outline;
pub mod resize;
pub mod stroke;

pub use brush::{stamp, IntensityField, RoundBrush, MAX_BRUSH_SIZE};
pub use filters::{filter_document, FilterKind};
pub use outline::selection_outline;
pub use resize::{resize, resize_document};
pub use stroke::{paint_stroke, Stroke};
