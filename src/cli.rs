// ============================================================================
// tilepaint CLI: headless document editing via command-line arguments
// ============================================================================
//
// Usage examples:
//   tilepaint -i photo.png --stamp 64,64,10 --color ff0000 -o out.png
//   tilepaint -i photo.png --select 10,10,100,80 --crop -o cut.png
//   tilepaint -i photo.png --select 0,0,50,50 --quickmask --outline ants.png
//   tilepaint -i photo.png --resize 320x240 --filter median,3 -o small.png
//   tilepaint -i photo.png --brush 8,0 --stroke 10,10,90,40,120,10 -o ink.png
//
// Steps run in a fixed order: load, --resize, --filter, --select, --deselect,
// --stamp, --stroke, render.  Resizing and filtering replace the image, so
// they come before any selection edits.  Stamps and strokes are confined to
// the selection when one was made.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use log::{debug, error, info, warn};

use crate::canvas::{
    Document, PixelRgba, Rect, RenderOptions, SelectionOp, SharedDocument, Size, Synchronizer, TileBuffer,
    COORD_LIMIT,
};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::logger;
use crate::ops::brush::{stamp, RoundBrush, MAX_BRUSH_SIZE};
use crate::ops::filters::{self, FilterKind, DEFAULT_RADIUS};
use crate::ops::resize::{self, MAX_DIMENSION};
use crate::ops::stroke::{self, PathPoint};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// A brush dab: centre plus optional size and softness.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StampArg {
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub softness: f64,
}

/// Brush used by `--stroke`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushArg {
    pub size: f64,
    pub softness: f64,
}

/// A pen path: the pen goes down on the first point and is dragged through
/// the rest.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeArg(pub Vec<PathPoint>);

/// A whole-image filter pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterArg {
    pub kind: FilterKind,
    pub radius: u32,
}

/// tilepaint headless document processor.
#[derive(Parser, Debug)]
#[command(
    name = "tilepaint",
    about = "Headless tiled paint document processor",
    long_about = "Load an image into a tiled document, edit the selection, paint brush\n\
                  stamps and write the flattened result, a selection crop, or the\n\
                  selection outline.\n\n\
                  Example:\n  \
                  tilepaint --input photo.png --select 0,0,64,64 --stamp 32,32,20 --output out.png"
)]
pub struct CliArgs {
    /// Input image.  Gray images stay gray, everything else is read as RGBA.
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Output file; format follows the extension.
    /// Defaults to `<input stem>_out.png` next to the input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Engine configuration (TOML).
    #[arg(short, long, value_name = "CFG.toml")]
    pub config: Option<PathBuf>,

    /// Add a rectangle to the selection.  Repeatable.
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_rect)]
    pub select: Vec<Rect>,

    /// Remove a rectangle from the selection.  Repeatable.
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_rect)]
    pub deselect: Vec<Rect>,

    /// Paint a round brush dab (size defaults to 10, softness to 0.5).  Repeatable.
    #[arg(long, value_name = "X,Y[,SIZE[,SOFTNESS]]", value_parser = parse_stamp)]
    pub stamp: Vec<StampArg>,

    /// Paint a brush stroke through the listed points.  Repeatable.
    #[arg(long, value_name = "X1,Y1[,X2,Y2...]", value_parser = parse_stroke)]
    pub stroke: Vec<StrokeArg>,

    /// Brush for --stroke.
    #[arg(long, value_name = "SIZE[,SOFTNESS]", default_value = "10,0.5", value_parser = parse_brush)]
    pub brush: BrushArg,

    /// Scale the image before editing.
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub resize: Option<Size>,

    /// Filter the whole image: median, maximize, minimize or blur
    /// (radius defaults to 10).  Repeatable; runs in the order given.
    #[arg(long, value_name = "NAME[,RADIUS]", value_parser = parse_filter)]
    pub filter: Vec<FilterArg>,

    /// Brush colour.
    #[arg(long, value_name = "RRGGBB", default_value = "000000", value_parser = parse_color)]
    pub color: PixelRgba,

    /// Tint the unselected area in the output.
    #[arg(long)]
    pub quickmask: bool,

    /// Write only the selected pixels, cut to the selection bounds.
    #[arg(long, conflicts_with = "quickmask")]
    pub crop: bool,

    /// Also write the selection outline (black edges on white) here.
    #[arg(long, value_name = "FILE")]
    pub outline: Option<PathBuf>,

    /// Session log file (defaults to the platform data directory).
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log at debug level and print timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the CLI and return an OS exit code (`0` success, `1` failure).
pub fn run(args: CliArgs) -> ExitCode {
    let config = match &args.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("error: could not read config '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };

    let level = if args.verbose { log::LevelFilter::Debug } else { config.log_level_filter() };
    logger::init(args.log_file.as_deref(), level);

    if config.render_threads > 0
        && let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(config.render_threads)
            .build_global()
    {
        warn!("could not size the render pool to {} threads: {e}", config.render_threads);
    }

    let start = Instant::now();
    match run_pipeline(&args, &config) {
        Ok(output) => {
            info!("wrote {}", output.display());
            if args.verbose {
                println!("  → {} ({:.0}ms)", output.display(), start.elapsed().as_secs_f64() * 1000.0);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Processing pipeline
// ============================================================================

/// Load, edit and write.  Returns the path of the main output.
pub fn run_pipeline(args: &CliArgs, config: &EngineConfig) -> Result<PathBuf> {
    // -- Step 1: Load ----------------------------------------------------
    let decoded = image::open(&args.input)?;
    let buffer = TileBuffer::from_dynamic(&decoded);
    let shared: SharedDocument = Arc::new(Synchronizer::new(Document::with_config(
        buffer.width(),
        buffer.height(),
        config.render_config(),
    )));

    // -- Step 2: Edit ----------------------------------------------------
    {
        let mut doc = shared.lock();
        doc.set_image(buffer);
        let abort = Some(shared.abort_flag());
        if let Some(size) = args.resize
            && !resize::resize_document(&mut doc, size.width, size.height, abort)
        {
            return Err(Error::Aborted);
        }
        for f in &args.filter {
            if !filters::filter_document(&mut doc, f.kind, f.radius, abort) {
                return Err(Error::Aborted);
            }
        }

        for rect in &args.select {
            doc.change_selection(SelectionOp::Add, *rect);
        }
        for rect in &args.deselect {
            doc.change_selection(SelectionOp::Sub, *rect);
        }

        let opts = RenderOptions::default()
            .with_color(args.color)
            .with_opacity(config.brush_opacity)
            .with_precision(config.blend_precision);
        for dab in &args.stamp {
            let operand = stamp(dab.x, dab.y, &RoundBrush::new(dab.size, dab.softness), dab.size);
            doc.paint_to_current_layer(&operand, &opts, abort);
        }
        for path in &args.stroke {
            let dabs = stroke::paint_stroke(&mut doc, &path.0, args.brush.size, args.brush.softness, &opts, abort);
            debug!("stroke through {} points: {dabs} dabs", path.0.len());
        }
        debug!("edits applied, selection {:?}", doc.selection_state());
    }

    // -- Step 3: Render and save -----------------------------------------
    let (bounds, selected) = {
        let doc = shared.lock();
        (doc.bounds(), doc.selection_rect().intersect(&doc.bounds()))
    };
    let image = if args.crop {
        let rect = if selected.is_empty() { bounds } else { selected };
        shared.crop(rect)
    } else {
        shared.render(bounds, args.quickmask)
    }
    .ok_or(Error::Aborted)?;

    let output = output_path(&args.input, args.output.as_deref());
    image.save(&output)?;

    if let Some(path) = &args.outline {
        let edges = shared.render_selection_outline(bounds).ok_or(Error::Aborted)?;
        edges.save(path)?;
        info!("outline written to {}", path.display());
    }

    Ok(output)
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_numbers<T: std::str::FromStr>(s: &str) -> std::result::Result<Vec<T>, String> {
    s.split(',')
        .map(|part| part.trim().parse::<T>().map_err(|_| format!("'{}' is not a number", part.trim())))
        .collect()
}

/// Finite numbers only; `inf` and `NaN` parse as f64 but are refused here.
fn parse_finite(s: &str) -> std::result::Result<Vec<f64>, String> {
    let v = parse_numbers::<f64>(s)?;
    match v.iter().find(|n| !n.is_finite()) {
        Some(n) => Err(format!("'{n}' is not a finite number")),
        None => Ok(v),
    }
}

fn check_point(x: f64, y: f64) -> std::result::Result<PathPoint, String> {
    let lim = COORD_LIMIT as f64;
    if x.abs() > lim || y.abs() > lim {
        return Err(format!("point {x},{y} is outside ±{COORD_LIMIT}"));
    }
    Ok((x, y))
}

/// `SIZE[,SOFTNESS]` shared by stamps and strokes.
fn check_brush(size: f64, softness: f64) -> std::result::Result<BrushArg, String> {
    if size <= 0.0 {
        return Err("brush size must be positive".to_string());
    }
    if size > MAX_BRUSH_SIZE {
        return Err(format!("brush size is limited to {MAX_BRUSH_SIZE}"));
    }
    Ok(BrushArg { size, softness: softness.clamp(0.0, 1.0) })
}

/// `X,Y,W,H` with a positive size, inside the coordinate range.
pub fn parse_rect(s: &str) -> std::result::Result<Rect, String> {
    let rect = match parse_numbers::<i32>(s)?.as_slice() {
        &[x, y, w, h] if w > 0 && h > 0 => Rect::new(x, y, w, h),
        &[_, _, _, _] => return Err("width and height must be positive".to_string()),
        _ => return Err("expected X,Y,W,H".to_string()),
    };
    if !rect.within_limits() {
        return Err(format!("rectangle must lie within ±{COORD_LIMIT}"));
    }
    Ok(rect)
}

/// `X,Y[,SIZE[,SOFTNESS]]`.
pub fn parse_stamp(s: &str) -> std::result::Result<StampArg, String> {
    let v = parse_finite(s)?;
    if !(2..=4).contains(&v.len()) {
        return Err("expected X,Y[,SIZE[,SOFTNESS]]".to_string());
    }
    let (x, y) = check_point(v[0], v[1])?;
    let brush = check_brush(v.get(2).copied().unwrap_or(10.0), v.get(3).copied().unwrap_or(0.5))?;
    Ok(StampArg { x, y, size: brush.size, softness: brush.softness })
}

/// `SIZE[,SOFTNESS]`.
pub fn parse_brush(s: &str) -> std::result::Result<BrushArg, String> {
    match parse_finite(s)?.as_slice() {
        &[size] => check_brush(size, 0.5),
        &[size, softness] => check_brush(size, softness),
        _ => Err("expected SIZE[,SOFTNESS]".to_string()),
    }
}

/// `X1,Y1[,X2,Y2...]`: one or more points.
pub fn parse_stroke(s: &str) -> std::result::Result<StrokeArg, String> {
    let v = parse_finite(s)?;
    if v.is_empty() || v.len() % 2 != 0 {
        return Err("expected X1,Y1[,X2,Y2...]".to_string());
    }
    v.chunks_exact(2).map(|p| check_point(p[0], p[1])).collect::<std::result::Result<_, _>>().map(StrokeArg)
}

/// `WxH`, each between 1 and `MAX_DIMENSION`.
pub fn parse_size(s: &str) -> std::result::Result<Size, String> {
    let (w, h) = s.split_once(['x', 'X']).ok_or_else(|| "expected WxH".to_string())?;
    let edge = |v: &str| match v.trim().parse::<u32>() {
        Ok(n) if (1..=MAX_DIMENSION).contains(&n) => Ok(n),
        _ => Err(format!("'{}' is not a size between 1 and {MAX_DIMENSION}", v.trim())),
    };
    Ok(Size::new(edge(w)?, edge(h)?))
}

/// `NAME[,RADIUS]`.
pub fn parse_filter(s: &str) -> std::result::Result<FilterArg, String> {
    let (name, radius) = match s.split_once(',') {
        Some((name, r)) => {
            let radius = r.trim().parse::<u32>().map_err(|_| format!("'{}' is not a radius", r.trim()))?;
            (name, radius)
        }
        None => (s, DEFAULT_RADIUS),
    };
    if radius > filters::MAX_RADIUS {
        return Err(format!("filter radius is limited to {}", filters::MAX_RADIUS));
    }
    Ok(FilterArg { kind: name.parse()?, radius })
}

/// `RRGGBB`, optionally prefixed with `#`.
pub fn parse_color(s: &str) -> std::result::Result<PixelRgba, String> {
    let hex = s.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(format!("'{s}' is not an RRGGBB colour"));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| format!("'{s}' is not an RRGGBB colour"))
    };
    Ok(PixelRgba::opaque(channel(0)?, channel(2)?, channel(4)?))
}

/// `--output`, or `<stem>_out.png` beside the input.
fn output_path(input: &Path, output: Option<&Path>) -> PathBuf {
    if let Some(out) = output {
        return out.to_path_buf();
    }
    let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "image".into());
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_out.png"))
}
