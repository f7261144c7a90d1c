//! Tiled raster document model and compositing engine.
//!
//! A [`Document`] holds a tiled RGBA image layer and a tiled gray selection
//! layer.  Operand layers (brush stamps, selection rectangles, loaded images)
//! are painted into it through the compositor, and render entry points
//! flatten any rectangle back into a plain buffer.  A [`SharedDocument`]
//! lets an owner thread edit while workers render snapshots and poll a
//! shared abort flag.

#![allow(clippy::too_many_arguments)]

pub mod canvas;
pub mod cli;
pub mod config;
pub mod error;
pub mod logger;
pub mod ops;

pub use canvas::{AbortFlag, Document, Layer, Point, Rect, RenderOptions, SharedDocument, Synchronizer};
pub use config::EngineConfig;
pub use error::{Error, Result};
