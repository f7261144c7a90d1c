use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use image::{Rgba, RgbaImage};
use tilepaint::canvas::{
    AbortFlag, BlendPrecision, Document, Layer, PixelRgba, Point, Rect, RenderConfig, RenderOptions,
    SelectionOp, SelectionState, SharedDocument, Synchronizer, TileBuffer, TileFormat,
};
use tilepaint::ops::brush::{stamp, RoundBrush};

const RED: PixelRgba = PixelRgba::opaque(255, 0, 0);

fn red_brush() -> RenderOptions {
    RenderOptions::default().with_color(RED)
}

fn gradient(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 2) as u8, (y * 3) as u8, 77, 255]))
}

fn disc(cx: f64, cy: f64, size: f64) -> Layer {
    stamp(cx, cy, &RoundBrush::new(size, 0.0), size)
}

#[test]
fn red_disc_on_a_blank_document() {
    let mut doc = Document::new(128, 128);
    doc.paint_to_current_layer(&disc(64.0, 64.0, 10.0), &red_brush(), None);

    let layer = doc.current_layer();
    let cells: Vec<Point> = layer.tiles().iter().map(|t| t.offset).collect();
    assert_eq!(
        cells,
        vec![Point::new(0, 0), Point::new(64, 0), Point::new(0, 64), Point::new(64, 64)]
    );
    for (x, y) in [(0, 0), (64, 0), (0, 64)] {
        assert_eq!(layer.find_tile(x, y).map(|t| t.offset), Some(Point::new(x, y)));
    }

    assert_eq!(layer.rgba_at(64, 64), RED);
    assert_eq!(layer.rgba_at(63, 64), RED);
    assert_eq!(layer.rgba_at(59, 59), PixelRgba::TRANSPARENT);
    assert_eq!(layer.rgba_at(100, 100), PixelRgba::TRANSPARENT);

    let img = doc.render_to_layer(doc.bounds(), false, None).unwrap();
    assert_eq!(img.get_pixel(64, 64).0, [255, 0, 0, 255]);
    assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 0]);
    assert_eq!(doc.current_layer().rect(), Rect::new(59, 59, 10, 10));
}

#[test]
fn selection_round_trip() {
    let mut doc = Document::new(128, 128);
    let r = Rect::new(10, 20, 50, 70);
    doc.change_selection(SelectionOp::Set, r);
    assert_eq!(doc.selection_state(), SelectionState::Active);

    let sel = doc.render_selection(doc.bounds(), None).unwrap();
    for (x, y, p) in sel.enumerate_pixels() {
        let inside = r.contains(Point::new(x as i32, y as i32));
        assert_eq!(p.0[0], if inside { 255 } else { 0 }, "at ({x}, {y})");
    }
}

#[test]
fn sub_after_add_restores_the_selection() {
    let mut doc = Document::new(128, 128);
    doc.change_selection(SelectionOp::Set, Rect::new(0, 0, 40, 40));
    let before = doc.render_selection(doc.bounds(), None).unwrap();

    let r = Rect::new(50, 30, 70, 20);
    doc.change_selection(SelectionOp::Add, r);
    assert_ne!(doc.render_selection(doc.bounds(), None).unwrap(), before);
    doc.change_selection(SelectionOp::Sub, r);
    assert_eq!(doc.render_selection(doc.bounds(), None).unwrap(), before);
    assert_eq!(doc.selection_rect(), Rect::new(0, 0, 40, 40));
}

#[test]
fn painting_is_confined_to_the_selection() {
    let mut doc = Document::new(64, 64);
    doc.change_selection(SelectionOp::Set, Rect::new(0, 0, 32, 64));
    let square = Layer::from_buffer(
        Point::ZERO,
        TileBuffer::Gray(image::GrayImage::from_pixel(64, 64, image::Luma([255]))),
    );
    doc.paint_to_current_layer(&square, &red_brush(), None);

    assert_eq!(doc.current_layer().rgba_at(31, 10), RED);
    assert_eq!(doc.current_layer().rgba_at(32, 10), PixelRgba::TRANSPARENT);
}

#[test]
fn quickmask_tints_only_the_unselected_area() {
    let mut doc = Document::new(64, 64);
    doc.set_image(RgbaImage::from_pixel(64, 64, Rgba([255, 255, 255, 255])));
    doc.change_selection(SelectionOp::Set, Rect::new(0, 0, 32, 64));

    let plain = doc.render_to_layer(doc.bounds(), false, None).unwrap();
    let tinted = doc.render_to_layer(doc.bounds(), true, None).unwrap();
    assert_eq!(tinted.get_pixel(5, 5), plain.get_pixel(5, 5));

    let [r, g, b, a] = tinted.get_pixel(40, 5).0;
    assert_eq!((r, a), (255, 255));
    assert_eq!(g, b);
    assert!((170..=190).contains(&g), "tinted green {g}");
}

#[test]
fn quickmask_without_selection_is_a_plain_render() {
    let mut doc = Document::new(16, 16);
    doc.set_image(gradient(16, 16));
    assert_eq!(
        doc.render_to_layer(doc.bounds(), true, None),
        doc.render_to_layer(doc.bounds(), false, None)
    );
}

#[test]
fn crop_keeps_only_selected_pixels() {
    let mut doc = Document::new(80, 80);
    doc.set_image(gradient(80, 80));
    doc.change_selection(SelectionOp::Set, Rect::new(10, 10, 20, 20));

    let cut = doc.crop(Rect::new(0, 0, 40, 40), None).unwrap();
    assert_eq!(cut.get_pixel(15, 15).0, [30, 45, 77, 255]);
    assert_eq!(cut.get_pixel(5, 5).0[3], 0);
    assert_eq!(cut.get_pixel(35, 15).0[3], 0);

    let selected = doc.selected_image(None).unwrap();
    assert_eq!(selected.dimensions(), (20, 20));
    assert_eq!(selected.get_pixel(0, 0).0, [20, 30, 77, 255]);
}

#[test]
fn set_image_scatters_into_tiles() {
    let mut img = RgbaImage::new(200, 100);
    img.put_pixel(150, 80, Rgba([1, 2, 3, 4]));
    let mut doc = Document::new(1, 1);
    doc.change_selection(SelectionOp::Set, Rect::new(0, 0, 1, 1));
    doc.set_image(img);

    assert_eq!(doc.size().width, 200);
    assert_eq!(doc.selection_state(), SelectionState::Empty);
    let layer = doc.current_layer();
    assert_eq!(layer.tile_count(), 1);
    assert_eq!(layer.tiles()[0].offset, Point::new(128, 64));
    assert_eq!(layer.rgba_at(150, 80), PixelRgba::new(1, 2, 3, 4));
}

#[test]
fn trim_shrinks_to_the_selection() {
    let mut doc = Document::new(100, 70);
    doc.set_image(gradient(100, 70));
    doc.change_selection(SelectionOp::Set, Rect::new(10, 10, 30, 20));
    assert!(doc.trim(None));

    assert_eq!((doc.size().width, doc.size().height), (30, 20));
    assert_eq!(doc.selection_state(), SelectionState::Empty);
    let img = doc.render_to_layer(doc.bounds(), false, None).unwrap();
    assert_eq!(img.get_pixel(0, 0).0, [20, 30, 77, 255]);
    assert_eq!(img.get_pixel(29, 19).0, [78, 87, 77, 255]);
}

#[test]
fn fixed_point_documents_track_float_ones() {
    let fixed = RenderConfig { precision: BlendPrecision::Fixed, ..RenderConfig::default() };
    let mut a = Document::new(32, 32);
    let mut b = Document::with_config(32, 32, fixed);
    for doc in [&mut a, &mut b] {
        doc.set_image(gradient(32, 32));
        let opts = RenderOptions::default()
            .with_color(PixelRgba::opaque(10, 200, 90))
            .with_opacity(100)
            .with_precision(doc.config().precision);
        doc.paint_to_current_layer(&disc(16.0, 16.0, 20.0), &opts, None);
    }
    let fa = a.render_to_layer(a.bounds(), false, None).unwrap();
    let fb = b.render_to_layer(b.bounds(), false, None).unwrap();
    for (pa, pb) in fa.pixels().zip(fb.pixels()) {
        for c in 0..4 {
            assert!((pa.0[c] as i32 - pb.0[c] as i32).abs() <= 3, "{pa:?} vs {pb:?}");
        }
    }
}

#[test]
fn clear_resets_both_layers() {
    let mut doc = Document::new(64, 64);
    doc.set_image(gradient(64, 64));
    doc.change_selection(SelectionOp::Set, Rect::new(1, 1, 2, 2));
    doc.clear();
    assert!(doc.current_layer().is_empty());
    assert!(doc.selection_layer().is_empty());
    assert_eq!(doc.size().width, 64);
    assert_eq!(doc.current_layer().format(), TileFormat::Rgba);
}

// ============================================================================
// Abort and threading
// ============================================================================

#[test]
fn abort_before_render_yields_nothing() {
    let mut doc = Document::new(256, 256);
    doc.set_image(gradient(256, 256));
    let shared: SharedDocument = Arc::new(Synchronizer::new(doc));

    shared.request_abort();
    assert!(shared.render(Rect::new(0, 0, 256, 256), false).is_none());
    assert!(shared.render_selection(Rect::new(0, 0, 256, 256)).is_none());
    assert!(shared.crop(Rect::new(0, 0, 256, 256)).is_none());
    assert!(shared.render_selection_outline(Rect::new(0, 0, 256, 256)).is_none());

    shared.clear_abort();
    let img = shared.render(Rect::new(0, 0, 256, 256), false).unwrap();
    shared.request_abort();
    assert_eq!(img.get_pixel(10, 10).0, [20, 30, 77, 255]);
}

#[test]
fn aborted_paint_writes_no_tiles() {
    let abort = AbortFlag::new();
    abort.request();
    let mut doc = Document::new(512, 512);
    let big = Layer::from_buffer(
        Point::ZERO,
        TileBuffer::Gray(image::GrayImage::from_pixel(512, 512, image::Luma([255]))),
    );
    doc.paint_to_current_layer(&big, &red_brush(), Some(&abort));
    assert!(doc.current_layer().is_empty());
}

#[test]
fn abort_raised_from_another_thread_is_seen() {
    let shared: SharedDocument = Arc::new(Synchronizer::new(Document::new(64, 64)));
    let s = Arc::clone(&shared);
    thread::spawn(move || s.request_abort()).join().unwrap();
    assert!(shared.abort_flag().is_set());
    assert!(shared.render(Rect::new(0, 0, 64, 64), false).is_none());
}

#[test]
fn abort_raised_while_a_worker_renders_stops_it() {
    let mut doc = Document::new(512, 512);
    doc.set_image(gradient(512, 512));
    let shared: SharedDocument = Arc::new(Synchronizer::new(doc));
    let (tx, rx) = mpsc::channel();

    let worker = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || {
            let mut finished = 0;
            while let Some(img) = shared.render(Rect::new(0, 0, 512, 512), true) {
                assert_eq!(img.dimensions(), (512, 512));
                finished += 1;
                let _ = tx.send(finished);
            }
            finished
        })
    };

    // Raise the flag while renders are in flight; the render that sees it
    // yields nothing and the worker loop ends.
    rx.recv().unwrap();
    shared.request_abort();
    let finished = worker.join().unwrap();
    assert!(finished >= 1);
    assert!(shared.render(Rect::new(0, 0, 512, 512), true).is_none());
}

#[test]
fn renders_run_while_the_owner_paints() {
    let shared: SharedDocument = Arc::new(Synchronizer::new(Document::new(256, 256)));
    let done = Arc::new(AtomicBool::new(false));

    let worker = {
        let shared = Arc::clone(&shared);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut renders = 0;
            while !done.load(Ordering::Acquire) {
                let img = shared.render(Rect::new(0, 0, 256, 256), true);
                assert!(img.is_some_and(|img| img.dimensions() == (256, 256)));
                renders += 1;
            }
            renders
        })
    };

    for i in 0..32 {
        let dab = disc(8.0 + i as f64 * 7.0, 128.0, 12.0);
        let mut doc = shared.lock();
        doc.paint_to_current_layer(&dab, &red_brush(), None);
        if i == 16 {
            doc.change_selection(SelectionOp::Set, Rect::new(0, 0, 128, 256));
        }
    }
    done.store(true, Ordering::Release);
    let renders = worker.join().unwrap();
    assert!(renders > 0);

    let img = shared.render(Rect::new(0, 0, 256, 256), false).unwrap();
    assert_eq!(img.get_pixel(8, 128).0, [255, 0, 0, 255]);
    // Dabs after the selection was set stay inside it.
    assert_eq!(img.get_pixel(225, 128).0, [0, 0, 0, 0]);
}

#[test]
fn snapshots_are_isolated_from_later_edits() {
    let shared = Synchronizer::new(Document::new(64, 64));
    shared.lock().paint_to_current_layer(&disc(10.0, 10.0, 6.0), &red_brush(), None);
    let snap = shared.snapshot();
    shared.lock().paint_to_current_layer(
        &disc(10.0, 10.0, 6.0),
        &RenderOptions::default().with_color(PixelRgba::opaque(0, 0, 255)),
        None,
    );
    assert_eq!(snap.current_layer().rgba_at(10, 10), RED);
    assert_eq!(shared.lock().current_layer().rgba_at(10, 10), PixelRgba::opaque(0, 0, 255));
}
