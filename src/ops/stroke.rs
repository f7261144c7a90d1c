// ============================================================================
// BRUSH STROKES: dabs spaced evenly along a smoothed pen path
// ============================================================================
//
// Each pen movement becomes a cubic Bézier from the previous pen position,
// with control points at its thirds.  The curve is walked in 1/16 parameter
// steps and a dab is placed every `span` pixels of travelled distance; the
// leftover distance carries over into the next segment so spacing stays even
// across pen events.

use log::{debug, warn};

use super::brush::{stamp, RoundBrush};
use crate::canvas::sync::aborted;
use crate::canvas::{AbortFlag, Document, Layer, RenderOptions};

/// Parameter step of the curve walk.
const T_STEP: f64 = 1.0 / 16.0;
/// Pen jumps longer than this many dab spacings are not filled in.
const MAX_SEGMENT_DABS: f64 = 65536.0;

pub type PathPoint = (f64, f64);

/// Point at `t` on the cubic Bézier through `p`.
pub fn cubic_bezier_point(p: &[PathPoint; 4], t: f64) -> PathPoint {
    let u = 1.0 - t;
    let eval = |a: f64, b: f64, c: f64, d: f64| {
        a * u * u * u + b * u * u * t * 3.0 + c * u * t * t * 3.0 + d * t * t * t
    };
    (eval(p[0].0, p[1].0, p[2].0, p[3].0), eval(p[0].1, p[1].1, p[2].1, p[3].1))
}

/// Dab placement state for one pen-down .. pen-up gesture.
#[derive(Clone, Debug)]
pub struct Stroke {
    size: f64,
    softness: f64,
    span: f64,
    curve: [PathPoint; 4],
    t: f64,
    next_distance: f64,
}

impl Stroke {
    pub fn new(size: f64, softness: f64) -> Self {
        Self {
            size,
            softness,
            span: (size / 8.0).max(0.5),
            curve: [(0.0, 0.0); 4],
            t: 0.0,
            next_distance: 0.0,
        }
    }

    /// Distance between consecutive dabs.
    pub fn span(&self) -> f64 {
        self.span
    }

    /// Start the gesture; the pen position gets a dab immediately.
    pub fn pen_down(&mut self, x: f64, y: f64) -> Vec<PathPoint> {
        self.curve = [(x, y); 4];
        self.t = 0.0;
        self.next_distance = self.span;
        vec![(x, y)]
    }

    /// Move the pen and return the centres of the dabs the move lays down.
    pub fn pen_to(&mut self, x: f64, y: f64) -> Vec<PathPoint> {
        let p0 = self.curve[3];
        let p3 = (x, y);
        self.curve = [
            p0,
            ((p0.0 * 2.0 + p3.0) / 3.0, (p0.1 * 2.0 + p3.1) / 3.0),
            ((p0.0 + p3.0 * 2.0) / 3.0, (p0.1 + p3.1 * 2.0) / 3.0),
            p3,
        ];

        let chord = (p3.0 - p0.0).hypot(p3.1 - p0.1);
        if !chord.is_finite() || chord / self.span > MAX_SEGMENT_DABS {
            warn!("pen jump of {chord} px skipped");
            self.next_distance = 0.0;
            return Vec::new();
        }
        self.walk()
    }

    /// End the gesture.  The next pen move starts with a dab.
    pub fn pen_up(&mut self) {
        self.next_distance = 0.0;
    }

    fn walk(&mut self) -> Vec<PathPoint> {
        let mut dabs = Vec::new();
        let mut pt0 = cubic_bezier_point(&self.curve, self.t);
        loop {
            if self.next_distance == 0.0 {
                dabs.push(pt0);
                self.next_distance = self.span;
            }
            let t = (self.t + T_STEP).min(1.0);
            let pt1 = cubic_bezier_point(&self.curve, t);
            let d = (pt0.0 - pt1.0).hypot(pt0.1 - pt1.1);
            if self.next_distance > d {
                self.next_distance -= d;
                self.t = t;
                pt0 = pt1;
            } else {
                self.t += (t - self.t) * self.next_distance / d;
                self.t = self.t.min(1.0);
                self.next_distance = 0.0;
                pt0 = cubic_bezier_point(&self.curve, self.t);
            }
            if self.t >= 1.0 {
                break;
            }
        }
        self.t = 0.0;
        dabs
    }

    /// Operand layer for one dab of this stroke's brush.
    pub fn dab(&self, (cx, cy): PathPoint) -> Layer {
        stamp(cx, cy, &RoundBrush::new(self.size, self.softness), self.size)
    }
}

/// Paint a whole pen path onto the document's image (confined to the
/// selection like any paint).  Returns the number of dabs painted; painting
/// stops early once `abort` is raised.
pub fn paint_stroke(
    doc: &mut Document,
    path: &[PathPoint],
    size: f64,
    softness: f64,
    opts: &RenderOptions,
    abort: Option<&AbortFlag>,
) -> usize {
    let Some((&(x, y), rest)) = path.split_first() else {
        return 0;
    };
    let mut stroke = Stroke::new(size, softness);
    let mut centres = stroke.pen_down(x, y);
    for &(x, y) in rest {
        centres.extend(stroke.pen_to(x, y));
    }
    stroke.pen_up();

    let mut painted = 0;
    for &centre in &centres {
        if aborted(abort) {
            break;
        }
        doc.paint_to_current_layer(&stroke.dab(centre), opts, abort);
        painted += 1;
    }
    debug!("stroke of {} points laid {painted} dabs", path.len());
    painted
}
